//! Step domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::TransitionError;

/// One stage of a job's pipeline
///
/// Steps of a job have contiguous, unique `order_index` values starting at 0.
/// Only the worker currently executing a step writes to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: i64,
    pub job_id: String,
    pub name: String,
    pub order_index: i32,
    pub status: StepStatus,
    pub progress: i32,
    pub details: HashMap<String, serde_json::Value>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Step execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub const ALL: [StepStatus; 5] = [
        StepStatus::Pending,
        StepStatus::Running,
        StepStatus::Completed,
        StepStatus::Failed,
        StepStatus::Skipped,
    ];

    /// Allowed moves: PENDING -> RUNNING | SKIPPED, RUNNING -> COMPLETED | FAILED.
    /// Staying in RUNNING is allowed so progress reports can be persisted.
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Pending, StepStatus::Skipped)
                | (StepStatus::Running, StepStatus::Running)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
        )
    }

    /// Whether a record stored as `self` may be overwritten with `next`.
    /// Rewriting the same status keeps details and progress updates possible.
    pub fn accepts_write(self, next: StepStatus) -> bool {
        self == next || self.can_transition_to(next)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "PENDING"),
            StepStatus::Running => write!(f, "RUNNING"),
            StepStatus::Completed => write!(f, "COMPLETED"),
            StepStatus::Failed => write!(f, "FAILED"),
            StepStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

impl Step {
    /// Creates the PENDING record for a declared pipeline stage.
    /// `id` is assigned by the store on insert.
    pub fn pending(job_id: &str, name: &str, order_index: i32) -> Self {
        Self {
            id: 0,
            job_id: job_id.to_string(),
            name: name.to_string(),
            order_index,
            status: StepStatus::Pending,
            progress: 0,
            details: HashMap::new(),
            error_message: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Moves the step to `next`, stamping timestamps on the way.
    pub fn transition(
        &mut self,
        next: StepStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Step {
                step: self.name.clone(),
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        match next {
            StepStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
            }
            StepStatus::Completed => {
                self.progress = 100;
                self.completed_at = Some(now);
            }
            StepStatus::Failed | StepStatus::Skipped => {
                self.completed_at = Some(now);
            }
            StepStatus::Pending => {}
        }
        Ok(())
    }

    /// Marks the step completed and records the handler output in `details`.
    pub fn complete(
        &mut self,
        output: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(StepStatus::Completed, now)?;
        self.details.insert("output".to_string(), output);
        Ok(())
    }

    /// Marks the step failed with the handler's error message.
    pub fn fail(&mut self, message: String, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(StepStatus::Failed, now)?;
        self.error_message = Some(message);
        Ok(())
    }
}
