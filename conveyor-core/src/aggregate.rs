//! Status aggregation
//!
//! Derives a job's status, progress and error message from its steps.
//! Everything here is pure: the same steps always yield the same aggregate.
//!
//! Rules, in priority order:
//! 1. no steps: PENDING, 0
//! 2. any FAILED: FAILED, progress counts every step before the first failure
//! 3. any RUNNING, or work done with steps still PENDING: RUNNING, a running
//!    step counts for `running_weight` of a completed one
//! 4. nothing left to run: COMPLETED, 100
//! 5. otherwise: PENDING, 0

use crate::domain::job::JobStatus;
use crate::domain::step::{Step, StepStatus};

/// Weight of a RUNNING step toward overall progress
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWeighting {
    pub running_weight: f64,
}

impl ProgressWeighting {
    /// Weight is clamped to `0.0..=1.0`
    pub fn new(running_weight: f64) -> Self {
        let running_weight = if running_weight.is_finite() {
            running_weight.clamp(0.0, 1.0)
        } else {
            0.5
        };
        Self { running_weight }
    }
}

impl Default for ProgressWeighting {
    fn default() -> Self {
        Self {
            running_weight: 0.5,
        }
    }
}

/// Aggregate status of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub status: JobStatus,
    pub progress: i32,
    pub error_message: Option<String>,
}

impl Aggregate {
    fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            progress: 0,
            error_message: None,
        }
    }
}

/// Aggregates with the default weighting (a running step is half done)
pub fn aggregate(steps: &[Step]) -> Aggregate {
    aggregate_with(steps, ProgressWeighting::default())
}

pub fn aggregate_with(steps: &[Step], weighting: ProgressWeighting) -> Aggregate {
    if steps.is_empty() {
        return Aggregate::pending();
    }

    let mut ordered: Vec<&Step> = steps.iter().collect();
    ordered.sort_by_key(|s| s.order_index);
    let total = ordered.len() as f64;

    if let Some(position) = ordered
        .iter()
        .position(|s| s.status == StepStatus::Failed)
    {
        return Aggregate {
            status: JobStatus::Failed,
            progress: percent(position as f64, total),
            error_message: ordered[position].error_message.clone(),
        };
    }

    let count = |status: StepStatus| ordered.iter().filter(|s| s.status == status).count();
    let done = count(StepStatus::Completed) + count(StepStatus::Skipped);
    let running = count(StepStatus::Running);
    let pending = count(StepStatus::Pending);

    if running > 0 || (done > 0 && pending > 0) {
        let weighted = done as f64 + weighting.running_weight * running as f64;
        return Aggregate {
            status: JobStatus::Running,
            progress: percent(weighted, total),
            error_message: None,
        };
    }

    if pending == 0 {
        return Aggregate {
            status: JobStatus::Completed,
            progress: 100,
            error_message: None,
        };
    }

    Aggregate::pending()
}

fn percent(done: f64, total: f64) -> i32 {
    ((done * 100.0) / total).floor().clamp(0.0, 100.0) as i32
}
