//! # eavdb HTTP API Module
//!
//! The responder over HTTP, using axum.
//!
//! ## Endpoints
//!
//! - `POST /message` - Handle one protocol message, returns the replies
//! - `GET /status` - Evaluation state and per-database counts
//! - `GET /databases/{name}` - Every triple of one database
//! - `GET /health` - Health check
//!
//! ## Configuration (Environment Variables)
//!
//! - `EAVDB_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)

mod handlers;
mod types;

pub use handlers::{database_handler, health_handler, message_handler, status_handler};
pub use types::{DatabaseResponse, DatabaseStatus, ErrorResponse, HealthResponse, StatusResponse};

use crate::responder::Responder;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use eavdb_core::EavError;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body (2 MB).
const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: one responder behind a lock.
#[derive(Clone)]
pub struct AppState {
    pub responder: Arc<RwLock<Responder>>,
}

impl AppState {
    #[must_use]
    pub fn new(responder: Responder) -> Self {
        Self {
            responder: Arc::new(RwLock::new(responder)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from `EAVDB_CORS_ORIGINS`.
///
/// - `*` allows every origin
/// - unset (or nothing valid) allows localhost only
/// - otherwise a comma-separated origin list
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("EAVDB_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!("CORS: allowing ALL origins (EAVDB_CORS_ORIGINS=*)");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => Some(hv),
                        Err(e) => {
                            tracing::warn!("CORS: invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();
            if allowed.is_empty() {
                tracing::warn!("CORS: no valid origins in EAVDB_CORS_ORIGINS, using localhost");
                build_localhost_cors()
            } else {
                restricted(allowed)
            }
        }
        None => build_localhost_cors(),
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();
    restricted(origins)
}

fn restricted(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/message", post(handlers::message_handler))
        .route("/databases/{name}", get(handlers::database_handler))
        .layer(middleware)
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve `responder` on `addr` until Ctrl+C.
pub async fn run_server(addr: &str, responder: Responder) -> Result<(), EavError> {
    let router = create_router(AppState::new(responder));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| EavError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("eavdb HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| EavError::IoError(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
