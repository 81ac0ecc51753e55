//! Step handlers
//!
//! A handler is the business logic of one pipeline stage. It receives the
//! previous stage's output and returns its own.

use anyhow::Result;
use async_trait::async_trait;
use conveyor_core::domain::step::{Step, StepStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::context::WorkerContext;

#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn run(&self, ctx: &StepContext, input: Value) -> Result<Value>;
}

/// What a handler knows about the step it is executing
pub struct StepContext {
    pub job_id: String,
    pub step_id: i64,
    pub name: String,
    pub order_index: i32,
    step: Arc<Mutex<Step>>,
    worker: Arc<WorkerContext>,
}

impl StepContext {
    pub(crate) fn new(step: Arc<Mutex<Step>>, snapshot: &Step, worker: Arc<WorkerContext>) -> Self {
        Self {
            job_id: snapshot.job_id.clone(),
            step_id: snapshot.id,
            name: snapshot.name.clone(),
            order_index: snapshot.order_index,
            step,
            worker,
        }
    }

    /// Records intermediate progress for the running step.
    ///
    /// `progress` is clamped to 0..=100; `details` entries are merged into the
    /// step's details map. Persists the step and publishes a fresh snapshot.
    pub async fn report_progress(
        &self,
        progress: i32,
        details: HashMap<String, Value>,
    ) -> Result<()> {
        let record = {
            let mut step = self.step.lock().await;
            step.transition(StepStatus::Running, chrono::Utc::now())?;
            step.progress = progress.clamp(0, 100);
            step.details.extend(details);
            step.clone()
        };

        self.worker.store.update_step(&record).await?;
        self.worker.publish(&self.job_id).await;
        Ok(())
    }
}

/// A pipeline stage: step name plus the handler that executes it
#[derive(Clone)]
pub struct StepDescriptor {
    pub name: String,
    pub handler: Arc<dyn StepHandler>,
}

impl std::fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Handlers keyed by step name
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Looks up the handler for a step name.
    ///
    /// Unknown names resolve to a handler that fails the step, so a job with a
    /// typo in its pipeline fails at that step instead of being stuck.
    pub fn resolve(&self, name: &str) -> StepDescriptor {
        let handler = self
            .handlers
            .get(name)
            .cloned()
            .unwrap_or_else(|| Arc::new(MissingHandler));

        StepDescriptor {
            name: name.to_string(),
            handler,
        }
    }

    /// Resolves descriptors for a job's step records, in execution order
    pub fn pipeline(&self, steps: &[Step]) -> Vec<StepDescriptor> {
        let mut ordered: Vec<&Step> = steps.iter().collect();
        ordered.sort_by_key(|s| s.order_index);
        ordered.into_iter().map(|s| self.resolve(&s.name)).collect()
    }
}

struct MissingHandler;

#[async_trait]
impl StepHandler for MissingHandler {
    async fn run(&self, ctx: &StepContext, _input: Value) -> Result<Value> {
        anyhow::bail!("no handler registered for step '{}'", ctx.name)
    }
}
