//! Job API Handlers
//!
//! HTTP endpoints for the job lifecycle.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use conveyor_core::domain::job::Job;
use conveyor_core::dto::job::{CreateJob, JobDetails};

use crate::api::error::ApiResult;
use crate::service::job_service;
use crate::state::AppState;

/// POST /jobs
/// Create a job and its PENDING steps
pub async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJob>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    tracing::info!("Creating job '{}' with {} step(s)", req.name, req.steps.len());

    let job = job_service::create_job(state.store.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /jobs/{id}
/// Get a job with its steps
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobDetails>> {
    tracing::debug!("Getting job: {}", id);

    let details = job_service::get_job(state.store.as_ref(), &id, state.weighting()).await?;
    Ok(Json(details))
}

/// GET /jobs
/// List all jobs
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<Job>>> {
    tracing::debug!("Listing all jobs");

    let jobs = job_service::list_jobs(state.store.as_ref()).await?;
    Ok(Json(jobs))
}

/// POST /jobs/{id}/cancel
/// Cancel a PENDING or RUNNING job
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    tracing::info!("Cancelling job: {}", id);

    let job = job_service::cancel_job(
        state.store.as_ref(),
        &state.registry,
        &id,
        state.weighting(),
    )
    .await?;
    Ok(Json(job))
}
