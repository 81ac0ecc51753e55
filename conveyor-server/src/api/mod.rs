//! API Module
//!
//! HTTP API layer for the server.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod internal;
pub mod job;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::ws;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/jobs", post(job::create_job).get(job::list_jobs))
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/cancel", post(job::cancel_job))
        // Worker push bridge
        .route("/internal/jobs/{job_id}/notify", post(internal::notify))
        // Observer sockets
        .route("/ws", get(ws::ws_handler))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
