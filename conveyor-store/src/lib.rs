//! Conveyor Store
//!
//! Persistence for job and step records.
//!
//! All access goes through the [`JobStore`] trait so the server, the workers
//! and the tests can share the same business logic over different backends:
//! - [`PgStore`]: PostgreSQL, the source of truth in deployments
//! - [`MemoryStore`]: in-process maps, for tests and local runs
//!
//! [`status`] holds the read-aggregate-write helpers built on top of the trait.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod status;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use conveyor_core::domain::job::Job;
use conveyor_core::domain::step::Step;
use conveyor_core::dto::job::{CreateJob, JobDetails};

/// Storage operations for jobs and their steps
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Creates a PENDING job and one PENDING step per declared name, atomically
    async fn create_job(&self, req: CreateJob) -> Result<JobDetails>;

    /// Finds a job by ID
    async fn find_job(&self, id: &str) -> Result<Option<Job>>;

    /// Lists all jobs, newest first
    async fn list_jobs(&self) -> Result<Vec<Job>>;

    /// Persists status, progress, error message and timestamps of a job.
    ///
    /// A CANCELLED job is never overwritten, and a CANCELLED write never
    /// replaces a COMPLETED or FAILED job; returns `false` when the write was
    /// skipped for either reason.
    async fn update_job(&self, job: &Job) -> Result<bool>;

    /// Lists a job's steps ordered by `order_index`
    async fn list_steps(&self, job_id: &str) -> Result<Vec<Step>>;

    /// Persists a single step record
    async fn update_step(&self, step: &Step) -> Result<()>;

    /// Claims the oldest unclaimed PENDING job for a worker
    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>>;
}

/// Builds the initial PENDING job and step records for a create request
pub(crate) fn new_records(req: CreateJob) -> (Job, Vec<Step>) {
    let id = uuid::Uuid::new_v4().to_string();

    let steps = req
        .steps
        .iter()
        .enumerate()
        .map(|(index, name)| Step::pending(&id, name, index as i32))
        .collect();

    let job = Job {
        id,
        name: req.name,
        job_type: req.job_type,
        owner_id: req.owner_id,
        status: conveyor_core::domain::job::JobStatus::Pending,
        progress: 0,
        error_message: None,
        created_at: chrono::Utc::now(),
        started_at: None,
        completed_at: None,
        metadata: req.metadata,
        input: req.input,
        worker_id: None,
    };

    (job, steps)
}
