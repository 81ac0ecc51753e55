//! Job poller
//!
//! Claims pending jobs and executes them. Each job runs in its own task;
//! steps within a job run sequentially.

use anyhow::{Context, Result};
use conveyor_core::domain::job::Job;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::context::WorkerContext;
use crate::pipeline::{ExecutionOutcome, PipelineExecutor};

/// Job poller that continuously claims and executes jobs
pub struct JobPoller {
    config: Config,
    ctx: Arc<WorkerContext>,
    executor: Arc<PipelineExecutor>,
    semaphore: Arc<Semaphore>,
}

impl JobPoller {
    pub fn new(config: Config, ctx: Arc<WorkerContext>, executor: Arc<PipelineExecutor>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_jobs));
        Self {
            config,
            ctx,
            executor,
            semaphore,
        }
    }

    /// Polls until `shutdown` resolves, then waits for in-flight jobs.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            "Starting job poller (interval: {:?}, max parallel jobs: {})",
            self.config.poll_interval,
            self.config.max_parallel_jobs
        );

        let mut interval = time::interval(self.config.poll_interval);
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, waiting for {} running job(s)", tasks.len());
                    break;
                }
                _ = interval.tick() => {
                    match self.poll_once(&mut tasks).await {
                        Ok(claimed) if claimed > 0 => info!("Claimed {} job(s) this cycle", claimed),
                        Ok(_) => debug!("No jobs available"),
                        Err(e) => error!("Error during poll cycle: {:#}", e),
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!("Job task panicked: {}", e);
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Job task panicked: {}", e);
            }
        }

        Ok(())
    }

    /// Claims jobs while permits are available
    pub async fn poll_once(&self, tasks: &mut JoinSet<()>) -> Result<usize> {
        let mut claimed = 0;

        loop {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                debug!("Max parallel jobs reached");
                break;
            };

            let job = self
                .ctx
                .store
                .claim_next(&self.config.worker_id)
                .await
                .context("Failed to claim job")?;

            let Some(job) = job else {
                break;
            };

            info!(job_id = %job.id, name = %job.name, "Claimed job");
            self.spawn_job_task(tasks, job, permit);
            claimed += 1;
        }

        Ok(claimed)
    }

    fn spawn_job_task(&self, tasks: &mut JoinSet<()>, job: Job, permit: OwnedSemaphorePermit) {
        let executor = Arc::clone(&self.executor);

        tasks.spawn(async move {
            let _permit = permit;

            match executor.execute(&job).await {
                Ok(ExecutionOutcome::Completed { .. }) => {
                    info!(job_id = %job.id, "Job completed");
                }
                Ok(ExecutionOutcome::Failed { step, error }) => {
                    warn!(job_id = %job.id, step = %step, "Job failed: {}", error);
                }
                Ok(ExecutionOutcome::Cancelled { skipped }) => {
                    info!(job_id = %job.id, skipped, "Job cancelled");
                }
                Err(e) => {
                    error!(job_id = %job.id, "Failed to execute job: {}", e);
                }
            }
        });
    }
}
