//! Domain errors

use thiserror::Error;

use crate::domain::job::JobStatus;
use crate::domain::step::StepStatus;

/// A state change that the lifecycle rules do not allow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job {job_id} is already {status}")]
    JobTerminal { job_id: String, status: JobStatus },

    #[error("step '{step}' cannot move from {from} to {to}")]
    Step {
        step: String,
        from: StepStatus,
        to: StepStatus,
    },
}
