//! Status snapshot
//!
//! A point-in-time view of a job and its steps. Snapshots are never stored;
//! they are rebuilt from the job and step records whenever one is needed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::job::{Job, JobStatus};
use crate::domain::step::{Step, StepStatus};

/// Job fields plus ordered step summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub job_id: String,
    pub name: String,
    pub job_type: String,
    pub status: JobStatus,
    pub progress: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub steps: Vec<StepSummary>,
    /// When the snapshot was built; observers keep the newest one
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSummary {
    pub id: i64,
    pub name: String,
    pub order_index: i32,
    pub status: StepStatus,
    pub progress: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub details: HashMap<String, serde_json::Value>,
}

impl From<&Step> for StepSummary {
    fn from(step: &Step) -> Self {
        Self {
            id: step.id,
            name: step.name.clone(),
            order_index: step.order_index,
            status: step.status,
            progress: step.progress,
            error_message: step.error_message.clone(),
            started_at: step.started_at,
            completed_at: step.completed_at,
            details: step.details.clone(),
        }
    }
}

impl StatusSnapshot {
    /// Builds a snapshot; steps are ordered by `order_index` regardless of input order.
    pub fn new(job: &Job, steps: &[Step]) -> Self {
        let mut summaries: Vec<StepSummary> = steps.iter().map(StepSummary::from).collect();
        summaries.sort_by_key(|s| s.order_index);

        Self {
            job_id: job.id.clone(),
            name: job.name.clone(),
            job_type: job.job_type.clone(),
            status: job.status,
            progress: job.progress,
            error_message: job.error_message.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            metadata: job.metadata.clone(),
            steps: summaries,
            generated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
