use crate::config::Settings;
use crate::create_app;
use crate::handlers::{HandlerCollaborator, HandlerContext};
use crate::routes::Operation;
use crate::state::AppState;
use crate::token::{Grant, Principal};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use chrono::Utc;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use policy_engine::{Enforcer, PolicyEnforcer, StaticSource};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub(crate) const TEST_MODEL: &str = r#"[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act, eft

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow)) && !some(where (p.eft == deny))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
"#;

/// alice is an admin, bob a standard user, carol read-only; dave carries no role
/// in his token and is bound to read-only-user by subject
pub(crate) const TEST_POLICY: &str = r#"
p, admin, user, read, allow
p, admin, user, write, allow
p, admin, user, delete, allow
p, admin, all-users, read, allow
p, admin, all-users, write, allow
p, admin, all-users, delete, allow
p, standard-user, user, read, allow
p, standard-user, user, write, allow
p, standard-user, user, delete, allow
p, read-only-user, user, read, allow
g, dave, read-only-user
"#;

/// What the recording collaborator saw for one dispatched request
#[derive(Debug, Clone)]
pub(crate) struct HandledRequest {
    pub operation: Operation,
    pub principal: Option<Principal>,
    pub saas: bool,
    pub path: String,
    pub headers: HeaderMap,
}

/// Handler collaborator that records each call and answers 200 with the operation id
#[derive(Debug, Default)]
pub(crate) struct RecordingHandlers {
    calls: Mutex<Vec<HandledRequest>>,
}

impl RecordingHandlers {
    pub fn calls(&self) -> Vec<HandledRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<HandledRequest> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HandlerCollaborator for RecordingHandlers {
    async fn handle(&self, ctx: HandlerContext, request: Request) -> Response {
        let subject = ctx.principal.as_ref().map(|p| p.subject.clone());
        self.calls.lock().unwrap().push(HandledRequest {
            operation: ctx.operation,
            principal: ctx.principal,
            saas: ctx.deployment.is_saas(),
            path: request.uri().path().to_string(),
            headers: request.headers().clone(),
        });
        (
            StatusCode::OK,
            Json(json!({ "operation": ctx.operation.id(), "subject": subject })),
        )
            .into_response()
    }
}

/// Complete gateway wired to an in-memory policy and a recording collaborator
pub(crate) struct TestFixture {
    pub app: Router,
    pub state: AppState,
    pub handlers: Arc<RecordingHandlers>,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_settings(Settings::for_test()).await
    }

    pub async fn with_settings(settings: Settings) -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let enforcer = Enforcer::new(StaticSource::new(TEST_MODEL, TEST_POLICY))
            .await
            .expect("Failed to load test policy");
        Self::with_enforcer(settings, Arc::new(enforcer))
    }

    pub fn with_enforcer(settings: Settings, enforcer: Arc<dyn PolicyEnforcer>) -> Self {
        let handlers = Arc::new(RecordingHandlers::default());
        let state = AppState::for_testing(settings, enforcer, handlers.clone());
        let app = create_app(state.clone()).expect("Failed to build router");

        Self {
            app,
            state,
            handlers,
        }
    }

    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// Access token for `subject`, carrying `role` when given
    pub fn token(&self, subject: &str, role: Option<&str>) -> String {
        let mut grant = Grant::subject(subject);
        if let Some(role) = role {
            grant = grant.with_role(role);
        }
        self.state
            .tokens
            .issue_for(&grant)
            .expect("Failed to issue token")
            .access_token
    }

    /// Token for `subject` that expired an hour ago
    pub fn expired_token(&self, subject: &str, role: Option<&str>) -> String {
        let mut grant = Grant::subject(subject);
        if let Some(role) = role {
            grant = grant.with_role(role);
        }
        let issued_at = Utc::now().timestamp() - self.state.tokens.ttl() as i64 - 3600;
        self.state
            .tokens
            .issue_at(&grant, issued_at)
            .expect("Failed to issue token")
            .access_token
    }

    pub fn request_builder(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        token: Option<&str>,
    ) -> http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri.as_ref());
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder.header("Content-Type", "application/json")
    }

    pub async fn call(&self, method: Method, uri: impl AsRef<str>, token: Option<&str>) -> TestResponse {
        let request = self
            .request_builder(method, uri, token)
            .body(Body::empty())
            .expect("Failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body).into_owned();
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };

        TestResponse {
            status,
            headers,
            text,
            json,
        }
    }
}

/// Response from a test request with the body read both as text and as JSON
pub(crate) struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub text: String,
    pub json: Value,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "Expected status {} but got {} with body: {}",
            expected, self.status, self.text
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn detail(&self) -> &str {
        self.json["detail"].as_str().unwrap_or_default()
    }
}
