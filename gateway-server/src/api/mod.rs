mod gateway;

use crate::api::gateway::authorization_gateway;
use crate::errors::{ApiError, StartupError};
use crate::handlers::HandlerContext;
use crate::openapi::RouteObserver;
use crate::routes::{Operation, RouteEntry, RouteTableError};
use crate::state::AppState;
use crate::token::Principal;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter};
use axum::{middleware, Json, Router};
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::openapi::OpenApi as OpenApiDocument;

/// Builds the router from the route table.
///
/// Public and protected entries go into separate routers; the authorization
/// gateway is attached once to the protected one, so no protected route can be
/// registered without it. The observer sees every group as it is registered.
pub(super) fn router(
    state: &AppState,
    observer: &mut dyn RouteObserver,
) -> Result<Router<AppState>, StartupError> {
    let mut public: BTreeMap<&str, MethodRouter<AppState>> = BTreeMap::new();
    let mut protected: BTreeMap<&str, MethodRouter<AppState>> = BTreeMap::new();

    for group in state.routes.groups() {
        for entry in &group.entries {
            let routes = if entry.access.is_protected() {
                &mut protected
            } else {
                &mut public
            };
            let filter = method_filter(entry)?;
            let operation = entry.operation;
            let method_router = routes
                .remove(entry.path.as_str())
                .unwrap_or_else(MethodRouter::new)
                .on(filter, move |State(state): State<AppState>, request: Request| {
                    dispatch(state, operation, request)
                });
            routes.insert(entry.path.as_str(), method_router);
        }
        observer.group_registered(group);
    }

    let public = public
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(path, method_router)
        });

    if protected.is_empty() {
        return Ok(public);
    }
    let protected = protected
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| {
            router.route(path, method_router)
        })
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            authorization_gateway,
        ));

    Ok(public.merge(protected))
}

fn method_filter(entry: &RouteEntry) -> Result<MethodFilter, StartupError> {
    MethodFilter::try_from(entry.method.clone()).map_err(|_| {
        RouteTableError::UnsupportedMethod {
            method: entry.method.clone(),
            path: entry.path.clone(),
        }
        .into()
    })
}

async fn dispatch(state: AppState, operation: Operation, mut request: Request) -> Response {
    let principal = request.extensions_mut().remove::<Principal>();

    match operation {
        Operation::Ping => "pong".into_response(),
        Operation::OpenApiDocs => match request.extensions().get::<Arc<OpenApiDocument>>() {
            Some(document) => Json(document.as_ref()).into_response(),
            None => ApiError::internal("API documentation is not available").into_response(),
        },
        _ => {
            debug!("Dispatching '{}' to the handler collaborator", operation.id());
            let ctx = HandlerContext {
                operation,
                principal,
                deployment: state.deployment,
                tokens: Arc::clone(&state.tokens),
            };
            state.handlers.handle(ctx, request).await
        }
    }
}
