//! Job Service
//!
//! Business logic for job creation, queries and cancellation.

use conveyor_core::ProgressWeighting;
use conveyor_core::domain::job::{Job, JobStatus};
use conveyor_core::dto::job::{CreateJob, JobDetails};
use conveyor_store::{JobStore, StoreError, status};
use std::collections::HashSet;
use thiserror::Error;

use crate::ws::ConnectionRegistry;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job {0} not found")]
    NotFound(String),

    #[error("Job {id} is already {status}")]
    AlreadyTerminal { id: String, status: JobStatus },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => JobError::NotFound(id),
            other => JobError::Store(other),
        }
    }
}

/// Validates and stores a new job with its PENDING steps
pub async fn create_job(store: &dyn JobStore, req: CreateJob) -> Result<Job, JobError> {
    validate(&req)?;

    let details = store.create_job(req).await?;
    tracing::info!(
        job_id = %details.job.id,
        steps = details.steps.len(),
        "Job created: {}",
        details.job.name
    );

    Ok(details.job)
}

fn validate(req: &CreateJob) -> Result<(), JobError> {
    if req.name.trim().is_empty() {
        return Err(JobError::Validation("Job name cannot be empty".to_string()));
    }

    if req.steps.is_empty() {
        return Err(JobError::Validation(
            "Job must declare at least one step".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for step in &req.steps {
        if step.trim().is_empty() {
            return Err(JobError::Validation("Step names cannot be empty".to_string()));
        }
        if !seen.insert(step.as_str()) {
            return Err(JobError::Validation(format!("Duplicate step name '{}'", step)));
        }
    }

    Ok(())
}

/// Gets a job with its steps, writing back the aggregate if it drifted
pub async fn get_job(
    store: &dyn JobStore,
    id: &str,
    weighting: ProgressWeighting,
) -> Result<JobDetails, JobError> {
    Ok(status::refresh_job(store, id, weighting).await?)
}

/// List all jobs, newest first
pub async fn list_jobs(store: &dyn JobStore) -> Result<Vec<Job>, JobError> {
    Ok(store.list_jobs().await?)
}

/// Cancels a PENDING or RUNNING job and pushes the result to local observers.
///
/// The worker notices the cancellation at its next step boundary.
pub async fn cancel_job(
    store: &dyn JobStore,
    registry: &ConnectionRegistry,
    id: &str,
    weighting: ProgressWeighting,
) -> Result<Job, JobError> {
    let mut job = store
        .find_job(id)
        .await?
        .ok_or_else(|| JobError::NotFound(id.to_string()))?;

    job.cancel(chrono::Utc::now())
        .map_err(|_| JobError::AlreadyTerminal {
            id: id.to_string(),
            status: job.status,
        })?;

    if !store.update_job(&job).await? {
        // The job finished (or was cancelled) after we read it
        let stored = store
            .find_job(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        return Err(JobError::AlreadyTerminal {
            id: id.to_string(),
            status: stored.status,
        });
    }

    tracing::info!(job_id = %id, "Job cancelled");

    let snapshot = status::snapshot(store, id, weighting).await?;
    registry.broadcast(id, &snapshot).await;

    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::{AccessPolicy, AttachError, Credentials, RegistryConfig};
    use async_trait::async_trait;
    use conveyor_core::domain::step::Step;
    use conveyor_store::MemoryStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Completes the job right after handing out the first read of it
    struct FinishesAfterRead {
        inner: MemoryStore,
        finished: AtomicBool,
    }

    #[async_trait]
    impl JobStore for FinishesAfterRead {
        async fn create_job(&self, req: CreateJob) -> conveyor_store::Result<JobDetails> {
            self.inner.create_job(req).await
        }

        async fn find_job(&self, id: &str) -> conveyor_store::Result<Option<Job>> {
            let job = self.inner.find_job(id).await?;
            if let Some(read) = &job {
                if !self.finished.swap(true, Ordering::SeqCst) {
                    let mut done = read.clone();
                    done.status = JobStatus::Completed;
                    done.progress = 100;
                    self.inner.update_job(&done).await?;
                }
            }
            Ok(job)
        }

        async fn list_jobs(&self) -> conveyor_store::Result<Vec<Job>> {
            self.inner.list_jobs().await
        }

        async fn update_job(&self, job: &Job) -> conveyor_store::Result<bool> {
            self.inner.update_job(job).await
        }

        async fn list_steps(&self, job_id: &str) -> conveyor_store::Result<Vec<Step>> {
            self.inner.list_steps(job_id).await
        }

        async fn update_step(&self, step: &Step) -> conveyor_store::Result<()> {
            self.inner.update_step(step).await
        }

        async fn claim_next(&self, worker_id: &str) -> conveyor_store::Result<Option<Job>> {
            self.inner.claim_next(worker_id).await
        }
    }

    struct AllowAll;

    #[async_trait]
    impl AccessPolicy for AllowAll {
        async fn authorize(&self, _: &Credentials, _: &str) -> Result<(), AttachError> {
            Ok(())
        }
    }

    fn request(steps: &[&str]) -> CreateJob {
        CreateJob {
            name: "ingest".to_string(),
            job_type: "document".to_string(),
            owner_id: "alice".to_string(),
            input: serde_json::Value::Null,
            steps: steps.iter().map(|s| s.to_string()).collect(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_validation() {
        assert!(validate(&request(&["a", "b"])).is_ok());
        assert!(matches!(validate(&request(&[])), Err(JobError::Validation(_))));
        assert!(matches!(
            validate(&request(&["a", "a"])),
            Err(JobError::Validation(_))
        ));

        let mut req = request(&["a"]);
        req.name = "  ".to_string();
        assert!(matches!(validate(&req), Err(JobError::Validation(_))));
    }

    #[tokio::test]
    async fn test_cancel_loses_to_job_finishing() {
        let store = FinishesAfterRead {
            inner: MemoryStore::new(),
            finished: AtomicBool::new(true),
        };
        let job = store.create_job(request(&["a"])).await.unwrap().job;
        store.finished.store(false, Ordering::SeqCst);

        let registry = ConnectionRegistry::new(Arc::new(AllowAll), RegistryConfig::default());
        let err = cancel_job(&store, &registry, &job.id, ProgressWeighting::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            JobError::AlreadyTerminal {
                status: JobStatus::Completed,
                ..
            }
        ));
        let stored = store.inner.find_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }
}
