mod api;
mod config;
mod deployment;
mod errors;
mod handlers;
mod openapi;
mod routes;
mod state;
#[cfg(test)]
mod test_utils;
mod token;

use crate::errors::StartupError;
use crate::openapi::ApiDocs;
use crate::state::AppState;
use axum::{Extension, Router};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load configuration
    let settings = match config::Settings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let port = settings.port;

    // Initialize application state: route table, signing key, policy, handlers
    let state = match AppState::new(settings).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application state: {}", e);
            std::process::exit(1);
        }
    };

    let app = match create_app(state.clone()) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to build router: {}", e);
            std::process::exit(1);
        }
    };

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(state));

    // Build server address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    // Start server
    let server = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    // Start the server and wait for it to finish
    info!("Server running on {}, press Ctrl+C to stop", addr);
    let serve = axum::serve(server, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = serve {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

/// Create a new application instance with a given state
pub fn create_app(state: AppState) -> Result<Router, StartupError> {
    let mut docs = ApiDocs::new();
    let router = api::router(&state, &mut docs)?;

    Ok(router
        .layer(Extension(Arc::new(docs.into_document())))
        .with_state(state))
}

/// Reloads the authorization policy whenever the process receives SIGHUP
#[cfg(unix)]
async fn reload_on_hangup(state: AppState) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            error!("Failed to install SIGHUP handler, policy reload disabled: {}", e);
            return;
        }
    };
    while hangup.recv().await.is_some() {
        info!("Received SIGHUP, reloading policy");
        state.reload_policy().await;
    }
}

// Simple signal handler that works on all platforms
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
