//! In-memory job store
//!
//! Keeps jobs and steps in maps behind a `tokio::sync::RwLock`. Used by the
//! test suites and for running a server and worker in one process.

use async_trait::async_trait;
use conveyor_core::domain::job::{Job, JobStatus};
use conveyor_core::TransitionError;
use conveyor_core::domain::step::Step;
use conveyor_core::dto::job::{CreateJob, JobDetails};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{JobStore, Result, StoreError};

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    /// Job IDs in creation order
    order: Vec<String>,
    steps: HashMap<String, Vec<Step>>,
    next_step_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_job(&self, req: CreateJob) -> Result<JobDetails> {
        let (job, mut steps) = crate::new_records(req);

        let mut inner = self.inner.write().await;
        for step in steps.iter_mut() {
            inner.next_step_id += 1;
            step.id = inner.next_step_id;
        }
        inner.order.push(job.id.clone());
        inner.jobs.insert(job.id.clone(), job.clone());
        inner.steps.insert(job.id.clone(), steps.clone());

        Ok(JobDetails { job, steps })
    }

    async fn find_job(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.inner.read().await.jobs.get(id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect())
    }

    async fn update_job(&self, job: &Job) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.jobs.get_mut(&job.id) else {
            return Ok(false);
        };

        if !stored.status.accepts_write(job.status) {
            return Ok(false);
        }

        stored.status = job.status;
        stored.progress = job.progress;
        stored.error_message = job.error_message.clone();
        stored.started_at = job.started_at;
        stored.completed_at = job.completed_at;
        Ok(true)
    }

    async fn list_steps(&self, job_id: &str) -> Result<Vec<Step>> {
        let inner = self.inner.read().await;
        let mut steps = inner.steps.get(job_id).cloned().unwrap_or_default();
        steps.sort_by_key(|s| s.order_index);
        Ok(steps)
    }

    async fn update_step(&self, step: &Step) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .steps
            .get_mut(&step.job_id)
            .and_then(|steps| steps.iter_mut().find(|s| s.id == step.id))
            .ok_or_else(|| StoreError::step_not_found(step.id))?;

        if !stored.status.accepts_write(step.status) {
            return Err(TransitionError::Step {
                step: stored.name.clone(),
                from: stored.status,
                to: step.status,
            }
            .into());
        }

        *stored = step.clone();
        Ok(())
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        let mut inner = self.inner.write().await;
        let next = inner.order.iter().find(|id| {
            inner
                .jobs
                .get(*id)
                .is_some_and(|j| j.status == JobStatus::Pending && j.worker_id.is_none())
        });

        let Some(id) = next.cloned() else {
            return Ok(None);
        };

        let job = inner.jobs.get_mut(&id).map(|job| {
            job.worker_id = Some(worker_id.to_string());
            job.clone()
        });
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::domain::step::StepStatus;

    fn create_request(steps: &[&str]) -> CreateJob {
        CreateJob {
            name: "quarterly report".to_string(),
            job_type: "document".to_string(),
            owner_id: "alice".to_string(),
            input: serde_json::json!({"text": "hello"}),
            steps: steps.iter().map(|s| s.to_string()).collect(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_contiguous_order() {
        let store = MemoryStore::new();
        let details = store
            .create_job(create_request(&["extract_text", "chunk_text", "summarize"]))
            .await
            .unwrap();

        assert_eq!(details.job.status, JobStatus::Pending);
        assert_eq!(details.job.progress, 0);

        let steps = store.list_steps(&details.job.id).await.unwrap();
        let indices: Vec<i32> = steps.iter().map(|s| s.order_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(steps.iter().all(|s| s.id > 0));
    }

    #[tokio::test]
    async fn test_claim_next_is_exclusive() {
        let store = MemoryStore::new();
        let first = store.create_job(create_request(&["a"])).await.unwrap();
        let second = store.create_job(create_request(&["a"])).await.unwrap();

        let claimed = store.claim_next("worker-1").await.unwrap().unwrap();
        assert_eq!(claimed.id, first.job.id);
        assert_eq!(claimed.worker_id.as_deref(), Some("worker-1"));

        let claimed = store.claim_next("worker-2").await.unwrap().unwrap();
        assert_eq!(claimed.id, second.job.id);

        assert!(store.claim_next("worker-3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_job_is_not_overwritten() {
        let store = MemoryStore::new();
        let mut job = store.create_job(create_request(&["a"])).await.unwrap().job;

        job.cancel(chrono::Utc::now()).unwrap();
        assert!(store.update_job(&job).await.unwrap());

        job.status = JobStatus::Running;
        assert!(!store.update_job(&job).await.unwrap());

        let stored = store.find_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_does_not_overwrite_finished_job() {
        let store = MemoryStore::new();
        let stale = store.create_job(create_request(&["a"])).await.unwrap().job;

        let mut finished = stale.clone();
        finished.status = JobStatus::Completed;
        finished.progress = 100;
        assert!(store.update_job(&finished).await.unwrap());

        let mut cancelled = stale;
        cancelled.cancel(chrono::Utc::now()).unwrap();
        assert!(!store.update_job(&cancelled).await.unwrap());

        let stored = store.find_job(&cancelled.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_update_unknown_step_is_not_found() {
        let store = MemoryStore::new();
        let step = Step::pending("missing", "a", 0);
        let err = store.update_step(&step).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_step_rejects_backwards_transition() {
        let store = MemoryStore::new();
        let details = store.create_job(create_request(&["a"])).await.unwrap();
        let mut step = details.steps[0].clone();
        let now = chrono::Utc::now();

        step.transition(StepStatus::Running, now).unwrap();
        store.update_step(&step).await.unwrap();
        step.complete(serde_json::json!("done"), now).unwrap();
        store.update_step(&step).await.unwrap();

        let mut rewound = step.clone();
        rewound.status = StepStatus::Pending;
        let err = store.update_step(&rewound).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Transition(TransitionError::Step {
                from: StepStatus::Completed,
                to: StepStatus::Pending,
                ..
            })
        ));

        let stored = store.list_steps(&details.job.id).await.unwrap();
        assert_eq!(stored[0].status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_jobs_newest_first() {
        let store = MemoryStore::new();
        let first = store.create_job(create_request(&["a"])).await.unwrap();
        let second = store.create_job(create_request(&["a"])).await.unwrap();

        let jobs = store.list_jobs().await.unwrap();
        assert_eq!(jobs[0].id, second.job.id);
        assert_eq!(jobs[1].id, first.job.id);
    }
}
