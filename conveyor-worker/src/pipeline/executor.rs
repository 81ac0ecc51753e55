//! Pipeline executor
//!
//! Runs a job's steps strictly in order, threading each handler's output into
//! the next. Every step transition is persisted before the aggregate is
//! recomputed and a snapshot is published.

use conveyor_core::TransitionError;
use conveyor_core::domain::job::{Job, JobStatus};
use conveyor_core::domain::step::{Step, StepStatus};
use conveyor_store::StoreError;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::handler::{HandlerRegistry, StepContext, StepDescriptor};
use crate::context::WorkerContext;

/// How a pipeline run ended
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Every step completed; carries the last handler's output
    Completed { output: Value },
    /// A handler failed; later steps were left PENDING
    Failed { step: String, error: String },
    /// The job was cancelled; `skipped` steps were marked SKIPPED
    Cancelled { skipped: usize },
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("job has {steps} step(s) but {descriptors} descriptor(s) were supplied")]
    LengthMismatch { steps: usize, descriptors: usize },

    #[error("step {index} is '{found}' but the pipeline declares '{expected}'")]
    StepMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("step '{name}' is {status} and cannot be executed")]
    UnexpectedStepState { name: String, status: StepStatus },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct PipelineExecutor {
    ctx: Arc<WorkerContext>,
    registry: Arc<HandlerRegistry>,
}

impl PipelineExecutor {
    pub fn new(ctx: Arc<WorkerContext>, registry: Arc<HandlerRegistry>) -> Self {
        Self { ctx, registry }
    }

    /// Runs a claimed job with handlers resolved from the registry
    pub async fn execute(&self, job: &Job) -> Result<ExecutionOutcome, ExecutionError> {
        let steps = self.ctx.store.list_steps(&job.id).await?;
        let descriptors = self.registry.pipeline(&steps);
        self.run(&job.id, &descriptors, job.input.clone()).await
    }

    /// Runs `descriptors` against the job's step records.
    ///
    /// Descriptor `i` must name the step with order index `i`. Steps already
    /// COMPLETED are not re-run; their stored output feeds the next step.
    pub async fn run(
        &self,
        job_id: &str,
        descriptors: &[StepDescriptor],
        input: Value,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let steps = self.ctx.store.list_steps(job_id).await?;
        check_pipeline(&steps, descriptors)?;

        info!(job_id = %job_id, steps = steps.len(), "Running pipeline");

        let mut input = input;
        for (index, (step, descriptor)) in steps.iter().zip(descriptors).enumerate() {
            if self.is_cancelled(job_id).await? {
                let skipped = self.skip_remaining(&steps[index..]).await?;
                self.ctx.publish(job_id).await;
                info!(job_id = %job_id, skipped, "Job cancelled, pipeline stopped");
                return Ok(ExecutionOutcome::Cancelled { skipped });
            }

            match step.status {
                StepStatus::Pending => {}
                StepStatus::Completed => {
                    debug!(job_id = %job_id, step = %step.name, "Step already completed, reusing output");
                    input = step.details.get("output").cloned().unwrap_or(Value::Null);
                    continue;
                }
                status => {
                    return Err(ExecutionError::UnexpectedStepState {
                        name: step.name.clone(),
                        status,
                    });
                }
            }

            match self.run_step(step.clone(), descriptor, input).await? {
                Ok(output) => input = output,
                Err(error) => {
                    return Ok(ExecutionOutcome::Failed {
                        step: step.name.clone(),
                        error,
                    });
                }
            }
        }

        info!(job_id = %job_id, "Pipeline completed");
        Ok(ExecutionOutcome::Completed { output: input })
    }

    /// Executes one step. The outer error is an infrastructure failure; the
    /// inner one is the handler's failure message, already recorded on the step.
    async fn run_step(
        &self,
        mut step: Step,
        descriptor: &StepDescriptor,
        input: Value,
    ) -> Result<Result<Value, String>, ExecutionError> {
        let job_id = step.job_id.clone();

        step.transition(StepStatus::Running, chrono::Utc::now())?;
        self.ctx.store.update_step(&step).await?;
        self.ctx.publish(&job_id).await;

        debug!(job_id = %job_id, step = %step.name, order_index = step.order_index, "Step started");

        let shared = Arc::new(Mutex::new(step.clone()));
        let step_ctx = StepContext::new(Arc::clone(&shared), &step, Arc::clone(&self.ctx));

        let result = AssertUnwindSafe(descriptor.handler.run(&step_ctx, input))
            .catch_unwind()
            .await;

        let mut step = shared.lock().await.clone();
        let now = chrono::Utc::now();

        let outcome = match result {
            Ok(Ok(output)) => {
                step.complete(output.clone(), now)?;
                debug!(job_id = %job_id, step = %step.name, "Step completed");
                Ok(output)
            }
            Ok(Err(e)) => {
                let message = format!("{:#}", e);
                step.fail(message.clone(), now)?;
                warn!(job_id = %job_id, step = %step.name, "Step failed: {}", message);
                Err(message)
            }
            Err(_) => {
                let message = format!("step '{}' panicked", step.name);
                step.fail(message.clone(), now)?;
                warn!(job_id = %job_id, step = %step.name, "Step handler panicked");
                Err(message)
            }
        };

        self.ctx.store.update_step(&step).await?;
        self.ctx.publish(&job_id).await;

        Ok(outcome)
    }

    async fn is_cancelled(&self, job_id: &str) -> Result<bool, ExecutionError> {
        let job = self
            .ctx
            .store
            .find_job(job_id)
            .await?
            .ok_or_else(|| ExecutionError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        Ok(job.status == JobStatus::Cancelled)
    }

    async fn skip_remaining(&self, steps: &[Step]) -> Result<usize, ExecutionError> {
        let now = chrono::Utc::now();
        let mut skipped = 0;

        for step in steps.iter().filter(|s| s.status == StepStatus::Pending) {
            let mut step = step.clone();
            step.transition(StepStatus::Skipped, now)?;
            self.ctx.store.update_step(&step).await?;
            skipped += 1;
        }

        Ok(skipped)
    }
}

fn check_pipeline(steps: &[Step], descriptors: &[StepDescriptor]) -> Result<(), ExecutionError> {
    if steps.len() != descriptors.len() {
        return Err(ExecutionError::LengthMismatch {
            steps: steps.len(),
            descriptors: descriptors.len(),
        });
    }

    for (index, (step, descriptor)) in steps.iter().zip(descriptors).enumerate() {
        if step.name != descriptor.name {
            return Err(ExecutionError::StepMismatch {
                index,
                expected: descriptor.name.clone(),
                found: step.name.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait::async_trait]
    impl super::super::StepHandler for Noop {
        async fn run(&self, _ctx: &StepContext, input: Value) -> anyhow::Result<Value> {
            Ok(input)
        }
    }

    fn descriptor(name: &str) -> StepDescriptor {
        StepDescriptor {
            name: name.to_string(),
            handler: Arc::new(Noop),
        }
    }

    #[test]
    fn test_check_pipeline_rejects_mismatch() {
        let steps = vec![Step::pending("job-1", "a", 0), Step::pending("job-1", "b", 1)];

        assert!(check_pipeline(&steps, &[descriptor("a"), descriptor("b")]).is_ok());
        assert!(matches!(
            check_pipeline(&steps, &[descriptor("a")]),
            Err(ExecutionError::LengthMismatch { steps: 2, descriptors: 1 })
        ));
        assert!(matches!(
            check_pipeline(&steps, &[descriptor("a"), descriptor("c")]),
            Err(ExecutionError::StepMismatch { index: 1, .. })
        ));
    }
}
