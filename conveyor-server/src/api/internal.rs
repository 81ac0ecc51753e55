//! Internal API Handlers
//!
//! Endpoints called by workers, authenticated with the shared API key.

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use conveyor_core::domain::snapshot::StatusSnapshot;
use conveyor_core::dto::job::{API_KEY_HEADER, NotifyResponse};

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// POST /internal/jobs/{job_id}/notify
/// Fan a worker's snapshot out to this process's observers
pub async fn notify(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
    Json(snapshot): Json<StatusSnapshot>,
) -> ApiResult<Json<NotifyResponse>> {
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !constant_time_eq(presented.as_bytes(), state.config.internal_api_key.as_bytes()) {
        tracing::warn!(job_id = %job_id, "Rejected notify with invalid API key");
        return Err(ApiError::Unauthorized);
    }

    if snapshot.job_id != job_id {
        return Err(ApiError::BadRequest(format!(
            "Snapshot is for job {}, not {}",
            snapshot.job_id, job_id
        )));
    }

    let notified = state.registry.broadcast(&job_id, &snapshot).await;
    tracing::debug!(job_id = %job_id, status = %snapshot.status, notified, "Snapshot fanned out");

    Ok(Json(NotifyResponse { job_id, notified }))
}

/// Compares without short-circuiting on the first differing byte
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() || b.is_empty() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
