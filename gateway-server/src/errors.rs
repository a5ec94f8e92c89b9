use crate::routes::RouteTableError;
use crate::token::AuthError;
use axum::response::IntoResponse;
use axum::Json;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderValue, StatusCode};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ApiError {
    pub detail: String,
    pub status_code: StatusCode,
}

impl ApiError {
    /// Create a new ApiError with a detail message and status code
    pub fn new<S: ToString>(detail: S, status_code: StatusCode) -> Self {
        Self {
            detail: detail.to_string(),
            status_code,
        }
    }

    /// Create new Bad Request Error (400) with a detail message
    pub fn bad_request<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::BAD_REQUEST)
    }

    /// Create new Unauthorized (401) with a detail message
    pub fn unauthorized<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::UNAUTHORIZED)
    }

    /// Create new Forbidden (403) with a detail message
    pub fn forbidden<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::FORBIDDEN)
    }

    /// Create new Internal Server Error (500) with a detail message
    pub fn internal<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Create new Bad Gateway (502) with a detail message
    pub fn bad_gateway<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::BAD_GATEWAY)
    }

    /// Create new Gateway Timeout (504) with a detail message
    pub fn gateway_timeout<S: ToString>(detail: S) -> Self {
        Self::new(detail, StatusCode::GATEWAY_TIMEOUT)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::unauthorized(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code;
        let body = json!({
            "detail": self.detail,
        });
        let mut response = (status_code, Json(body)).into_response();
        if status_code == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Failures that prevent the gateway from serving requests
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] confique::Error),

    #[error("Failed to load authorization policy: {0}")]
    Policy(#[from] policy_engine::LoadError),

    #[error(
        "No token signing key configured; set DEEPFENCE_JWT_SECRET or DEEPFENCE_JWT_SECRET_FILE, \
         or DEEPFENCE_JWT_EPHEMERAL_KEY=true for a non-persistent key"
    )]
    MissingSigningKey,

    #[error("Token signing key is {len} bytes, at least {min} are required")]
    WeakSigningKey { len: usize, min: usize },

    #[error("Failed to read signing key from {path}: {source}")]
    SigningKeyFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid route table: {0}")]
    RouteTable(#[from] RouteTableError),

    #[error("Invalid handler service URL: {0}")]
    HandlersUrl(#[from] url::ParseError),

    #[error("Failed to create handler service client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
