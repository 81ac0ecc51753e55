//! PostgreSQL backend
//!
//! Repositories are plain async functions over a pool (or a transaction);
//! [`PgStore`] wires them into the [`JobStore`] trait.

pub mod db;
pub mod job;
pub mod step;

use async_trait::async_trait;
use conveyor_core::TransitionError;
use conveyor_core::domain::job::Job;
use conveyor_core::domain::step::Step;
use conveyor_core::dto::job::{CreateJob, JobDetails};
use sqlx::PgPool;

pub use job as job_repository;
pub use step as step_repository;

use crate::{JobStore, Result, StoreError};

/// PostgreSQL-backed job store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and runs migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = db::create_pool(database_url).await?;
        db::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_job(&self, req: CreateJob) -> Result<JobDetails> {
        let (job, mut steps) = crate::new_records(req);

        let mut tx = self.pool.begin().await?;
        job_repository::insert(&mut *tx, &job).await?;
        for step in steps.iter_mut() {
            step.id = step_repository::insert(&mut *tx, step).await?;
        }
        tx.commit().await?;

        tracing::debug!(job_id = %job.id, steps = steps.len(), "Job and steps inserted");

        Ok(JobDetails { job, steps })
    }

    async fn find_job(&self, id: &str) -> Result<Option<Job>> {
        Ok(job_repository::find_by_id(&self.pool, id).await?)
    }

    async fn list_jobs(&self) -> Result<Vec<Job>> {
        Ok(job_repository::list_all(&self.pool).await?)
    }

    async fn update_job(&self, job: &Job) -> Result<bool> {
        Ok(job_repository::update_state(&self.pool, job).await?)
    }

    async fn list_steps(&self, job_id: &str) -> Result<Vec<Step>> {
        Ok(step_repository::find_by_job(&self.pool, job_id).await?)
    }

    async fn update_step(&self, step: &Step) -> Result<()> {
        if step_repository::update(&self.pool, step).await? {
            return Ok(());
        }

        match step_repository::find_status(&self.pool, step.id).await? {
            None => Err(StoreError::step_not_found(step.id)),
            Some(from) => Err(TransitionError::Step {
                step: step.name.clone(),
                from,
                to: step.status,
            }
            .into()),
        }
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        Ok(job_repository::claim_next(&self.pool, worker_id).await?)
    }
}
