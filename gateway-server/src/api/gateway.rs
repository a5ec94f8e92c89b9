//! Authentication and authorization gate in front of every protected route.

use crate::errors::ApiError;
use crate::routes::Access;
use crate::state::AppState;
use crate::token::Principal;
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::AUTHORIZATION;
use http::HeaderMap;
use log::{debug, warn};

/// Verifies the bearer token, checks the route's permission and binds the
/// [`Principal`] to the request for the dispatcher.
pub(crate) async fn authorization_gateway(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let entry = request
        .extensions()
        .get::<MatchedPath>()
        .and_then(|matched| state.routes.find(request.method(), matched.as_str()));
    let Some(entry) = entry else {
        warn!(
            "Rejected {} {}: route is not declared in the route table",
            request.method(),
            request.uri().path()
        );
        return ApiError::forbidden("Permission denied").into_response();
    };
    let access = entry.access;
    let operation = entry.operation;

    if access == Access::Public {
        return next.run(request).await;
    }

    let principal = match authenticate(&state, request.headers()) {
        Ok(principal) => principal,
        Err(err) => {
            warn!(
                "Rejected {} {}: {}",
                request.method(),
                request.uri().path(),
                err.detail
            );
            return err.into_response();
        }
    };

    if let Access::Permission(permission) = access {
        // The token role counts as one more binding of the subject for this request
        if !state.enforcer.authorize(
            &principal.subject,
            principal.role.as_deref(),
            permission.resource,
            permission.action,
        ) {
            warn!(
                "Rejected {} {}: '{}' (role {:?}) lacks {} permission on {}",
                request.method(),
                request.uri().path(),
                principal.subject,
                principal.role,
                permission.action,
                permission.resource
            );
            return ApiError::forbidden("Permission denied").into_response();
        }
    }

    debug!(
        "Authorized '{}' for subject '{}'",
        operation.id(),
        principal.subject
    );
    request.extensions_mut().insert(principal);
    next.run(request).await
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let token = bearer_token(headers)?;
    Ok(state.tokens.verify(token)?)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;
    let value = header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header"))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(ApiError::unauthorized(
            "Invalid Authorization header, expected 'Bearer <token>'",
        )),
    }
}
