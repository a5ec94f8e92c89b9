use super::{HandlerCollaborator, HandlerContext};
use crate::config::HandlersConfig;
use crate::errors::{ApiError, StartupError};
use crate::token::Grant;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::{AUTHORIZATION, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use log::{debug, error};
use reqwest::Client;
use std::error::Error as StdError;
use std::time::Duration;
use url::Url;

pub(crate) const USER_ID_HEADER: &str = "x-deepfence-user-id";
pub(crate) const USER_ROLE_HEADER: &str = "x-deepfence-user-role";
pub(crate) const SAAS_DEPLOYMENT_HEADER: &str = "x-deepfence-saas-deployment";
pub(crate) const OPERATION_HEADER: &str = "x-deepfence-operation";
/// Headers under this prefix are set by the gateway only; callers cannot supply them
const GATEWAY_HEADER_PREFIX: &str = "x-deepfence-";

/// Forwards every operation to the console's handler service over HTTP
pub(crate) struct UpstreamHandlers {
    client: Client,
    config: HandlersConfig,
}

impl UpstreamHandlers {
    pub fn new(config: &HandlersConfig) -> Result<Self, StartupError> {
        Url::parse(&config.url)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.client_timeout))
            .connect_timeout(Duration::from_secs(2))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    async fn forward(
        &self,
        ctx: &HandlerContext,
        request: Request,
    ) -> Result<reqwest::Response, ApiError> {
        let (parts, body) = request.into_parts();
        let path = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        let url = self.config.get_url(path);
        debug!(
            "Forwarding {} {} to handler service as '{}'",
            parts.method,
            url,
            ctx.operation.id()
        );

        let headers = forwarded_headers(&parts.headers, ctx)?;
        let body = to_bytes(body, usize::MAX)
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read request body: {e}")))?;

        let mut builder = self
            .client
            .request(parts.method, url.as_str())
            .headers(headers);
        if !body.is_empty() {
            builder = builder.body(body);
        }

        builder.send().await.map_err(|e| {
            error!(
                "Failed to reach handler service: {} (URL: {}, source: {:?})",
                e,
                url,
                e.source()
            );
            if e.is_timeout() {
                ApiError::gateway_timeout("Request to handler service timed out")
            } else if e.is_connect() {
                ApiError::bad_gateway("Connection error occurred while connecting to handler service")
            } else {
                ApiError::bad_gateway(format!("Failed to send request to handler service: {e}"))
            }
        })
    }
}

#[async_trait]
impl HandlerCollaborator for UpstreamHandlers {
    async fn handle(&self, ctx: HandlerContext, request: Request) -> Response {
        let response = match self.forward(&ctx, request).await {
            Ok(response) => response,
            Err(err) => return err.into_response(),
        };

        if ctx.operation.mints_token() && response.status().is_success() {
            issue_token(&ctx, response).await
        } else {
            relay(response).await
        }
    }
}

fn forwarded_headers(incoming: &HeaderMap, ctx: &HandlerContext) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    for (name, value) in incoming {
        if is_hop_header(name) || name == AUTHORIZATION || name == HOST {
            continue;
        }
        if name.as_str().starts_with(GATEWAY_HEADER_PREFIX) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers.insert(
        HeaderName::from_static(OPERATION_HEADER),
        HeaderValue::from_static(ctx.operation.id()),
    );
    headers.insert(
        HeaderName::from_static(SAAS_DEPLOYMENT_HEADER),
        HeaderValue::from_static(if ctx.deployment.is_saas() {
            "true"
        } else {
            "false"
        }),
    );

    if let Some(principal) = &ctx.principal {
        let subject = HeaderValue::from_str(&principal.subject)
            .map_err(|_| ApiError::internal("Subject cannot be forwarded to handler service"))?;
        headers.insert(HeaderName::from_static(USER_ID_HEADER), subject);

        if let Some(role) = &principal.role {
            let role = HeaderValue::from_str(role)
                .map_err(|_| ApiError::internal("Role cannot be forwarded to handler service"))?;
            headers.insert(HeaderName::from_static(USER_ROLE_HEADER), role);
        }
    }

    Ok(headers)
}

fn is_hop_header(name: &HeaderName) -> bool {
    name == CONNECTION || name == TRANSFER_ENCODING || name == CONTENT_LENGTH
}

/// Passes the handler service response through unchanged
async fn relay(response: reqwest::Response) -> Response {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read handler service response body: {}", e);
            return ApiError::bad_gateway("Failed to read handler service response").into_response();
        }
    };

    let mut resp = Response::new(Body::from(bytes));
    *resp.status_mut() = status;
    for (name, value) in headers.iter() {
        if !is_hop_header(name) {
            resp.headers_mut().append(name.clone(), value.clone());
        }
    }
    resp
}

/// Turns the identity confirmed by the handler service into an access token
async fn issue_token(ctx: &HandlerContext, response: reqwest::Response) -> Response {
    let grant: Grant = match response.json().await {
        Ok(grant) => grant,
        Err(e) => {
            error!(
                "Handler service returned an unusable identity for '{}': {}",
                ctx.operation.id(),
                e
            );
            return ApiError::bad_gateway("Handler service returned an invalid identity")
                .into_response();
        }
    };
    if grant.subject.is_empty() {
        error!(
            "Handler service returned an empty subject for '{}'",
            ctx.operation.id()
        );
        return ApiError::bad_gateway("Handler service returned an invalid identity")
            .into_response();
    }

    match ctx.tokens.issue_for(&grant) {
        Ok(issued) => (StatusCode::OK, Json(issued)).into_response(),
        Err(e) => {
            error!("{}", e);
            ApiError::internal("Failed to issue access token").into_response()
        }
    }
}
