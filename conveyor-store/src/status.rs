//! Aggregate refresh
//!
//! Reads a job's steps, recomputes the aggregate and writes it back. Both the
//! worker (after every step transition) and the server (on reads) go through
//! here; writes are idempotent recomputations, so the last one wins.

use conveyor_core::ProgressWeighting;
use conveyor_core::aggregate_with;
use conveyor_core::domain::snapshot::StatusSnapshot;
use conveyor_core::dto::job::JobDetails;

use crate::{JobStore, Result, StoreError};

/// Recomputes and persists the aggregate status of a job
pub async fn refresh_job(
    store: &dyn JobStore,
    job_id: &str,
    weighting: ProgressWeighting,
) -> Result<JobDetails> {
    let mut job = store
        .find_job(job_id)
        .await?
        .ok_or_else(|| StoreError::job_not_found(job_id))?;
    let steps = store.list_steps(job_id).await?;

    let aggregate = aggregate_with(&steps, weighting);
    if job.apply_aggregate(&aggregate, chrono::Utc::now()) && !store.update_job(&job).await? {
        // Lost a race against a cancel; the stored record is authoritative
        job = store
            .find_job(job_id)
            .await?
            .ok_or_else(|| StoreError::job_not_found(job_id))?;
    }

    Ok(JobDetails { job, steps })
}

/// Builds a fresh snapshot from the stored records
pub async fn snapshot(
    store: &dyn JobStore,
    job_id: &str,
    weighting: ProgressWeighting,
) -> Result<StatusSnapshot> {
    let details = refresh_job(store, job_id, weighting).await?;
    Ok(StatusSnapshot::new(&details.job, &details.steps))
}
