//! Business handlers the gateway dispatches to once a request has passed the gate.

pub(crate) mod upstream;

use crate::deployment::DeploymentMode;
use crate::routes::Operation;
use crate::token::{Principal, TokenAuthority};
use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use std::sync::Arc;

pub(crate) use upstream::UpstreamHandlers;

/// What a handler knows about the request beyond the request itself
#[derive(Clone)]
pub struct HandlerContext {
    pub operation: Operation,
    /// Present on every protected route, absent on public ones
    pub principal: Option<Principal>,
    pub deployment: DeploymentMode,
    pub tokens: Arc<TokenAuthority>,
}

/// Implementation of the console's business operations
#[async_trait]
pub trait HandlerCollaborator: Send + Sync {
    async fn handle(&self, ctx: HandlerContext, request: Request) -> Response;
}
