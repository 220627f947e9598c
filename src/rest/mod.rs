//! REST API for the workflow runner.
//!
//! Read-only access to runs, share links and resumable sessions, plus the
//! receiver for best-effort unload beacons. Nothing here mutates run state.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod state;

pub use openapi::ApiDoc;
pub use server::{RestApiServer, RestApiStatus};
pub use state::ApiState;

/// Build the API router with all routes
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health endpoints
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/status", get(routes::health::status))
        // Share links
        .route("/api/v1/share/:token", get(routes::shares::resolve))
        // Runs
        .route("/api/v1/runs/:id", get(routes::runs::get_one))
        // Sessions
        .route("/api/v1/sessions/active", get(routes::sessions::active))
        .route(
            "/api/v1/sessions/:id/beacon",
            post(routes::sessions::beacon),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve the API until ctrl-c
pub async fn serve(state: ApiState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.api.host, state.config.api.port)
        .parse()
        .context("Invalid api.host / api.port")?;

    if !is_local(addr) {
        tracing::warn!(
            %addr,
            "Run and session reads are unauthenticated; bind to loopback unless a proxy guards them"
        );
    }

    let server = RestApiServer::start(state, addr).await?;
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    server.stop().await;
    Ok(())
}

/// Run reads and the session listing carry private run data and are meant
/// for the local client. Public access goes through share tokens.
fn is_local(addr: SocketAddr) -> bool {
    addr.ip().is_loopback()
}
