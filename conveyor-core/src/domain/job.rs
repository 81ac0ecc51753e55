//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::aggregate::Aggregate;
use crate::error::TransitionError;

/// Aggregate job record
///
/// Structure shared between server (persists, serves) and worker (updates).
/// `status` and `progress` are always recomputed from the job's steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub job_type: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub progress: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Input handed to the first step of the pipeline
    pub input: serde_json::Value,
    /// Worker that claimed the job, if any
    pub worker_id: Option<String>,
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Completed, failed and cancelled jobs never change status again
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether a record stored as `self` may be overwritten with `next`.
    /// CANCELLED is final, and only a live job can become CANCELLED.
    pub fn accepts_write(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Cancelled, _) => false,
            (stored, JobStatus::Cancelled) => !stored.is_terminal(),
            _ => true,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Completed => write!(f, "COMPLETED"),
            JobStatus::Failed => write!(f, "FAILED"),
            JobStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl Job {
    /// Writes a freshly computed aggregate into the job record.
    ///
    /// `started_at` is stamped on the first move out of PENDING and
    /// `completed_at` on the first move into a terminal state; neither is
    /// overwritten afterwards. A cancelled job keeps its status.
    ///
    /// Returns `true` when any field changed.
    pub fn apply_aggregate(&mut self, aggregate: &Aggregate, now: DateTime<Utc>) -> bool {
        if self.status == JobStatus::Cancelled {
            return false;
        }

        let before = (
            self.status,
            self.progress,
            self.error_message.clone(),
            self.started_at,
            self.completed_at,
        );

        self.status = aggregate.status;
        self.progress = aggregate.progress;
        self.error_message = aggregate.error_message.clone();

        if self.status != JobStatus::Pending && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if self.status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }

        before
            != (
                self.status,
                self.progress,
                self.error_message.clone(),
                self.started_at,
                self.completed_at,
            )
    }

    /// Marks the job cancelled. Only PENDING and RUNNING jobs can be cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::JobTerminal {
                job_id: self.id.clone(),
                status: self.status,
            });
        }

        self.status = JobStatus::Cancelled;
        if self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_job() -> Job {
        Job {
            id: "job-1".to_string(),
            name: "ingest".to_string(),
            job_type: "document".to_string(),
            owner_id: "alice".to_string(),
            status: JobStatus::Pending,
            progress: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            metadata: HashMap::new(),
            input: serde_json::Value::Null,
            worker_id: None,
        }
    }

    fn agg(status: JobStatus, progress: i32) -> Aggregate {
        Aggregate {
            status,
            progress,
            error_message: None,
        }
    }

    #[test]
    fn test_started_at_is_set_once() {
        let mut job = pending_job();
        let first = Utc::now();
        assert!(job.apply_aggregate(&agg(JobStatus::Running, 16), first));
        assert_eq!(job.started_at, Some(first));

        let later = first + chrono::Duration::seconds(5);
        job.apply_aggregate(&agg(JobStatus::Running, 50), later);
        assert_eq!(job.started_at, Some(first));
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_completed_at_is_set_on_terminal() {
        let mut job = pending_job();
        let now = Utc::now();
        job.apply_aggregate(&agg(JobStatus::Completed, 100), now);
        assert_eq!(job.started_at, Some(now));
        assert_eq!(job.completed_at, Some(now));
    }

    #[test]
    fn test_apply_is_noop_when_unchanged() {
        let mut job = pending_job();
        assert!(!job.apply_aggregate(&agg(JobStatus::Pending, 0), Utc::now()));
    }

    #[test]
    fn test_cancelled_job_is_sticky() {
        let mut job = pending_job();
        job.cancel(Utc::now()).unwrap();
        assert!(!job.apply_aggregate(&agg(JobStatus::Running, 50), Utc::now()));
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_cancel_terminal_job_fails() {
        let mut job = pending_job();
        job.status = JobStatus::Completed;
        assert!(matches!(
            job.cancel(Utc::now()),
            Err(TransitionError::JobTerminal { .. })
        ));
    }

    #[test]
    fn test_accepts_write_guards_cancellation() {
        assert!(JobStatus::Running.accepts_write(JobStatus::Cancelled));
        assert!(JobStatus::Pending.accepts_write(JobStatus::Cancelled));
        assert!(!JobStatus::Completed.accepts_write(JobStatus::Cancelled));
        assert!(!JobStatus::Failed.accepts_write(JobStatus::Cancelled));
        assert!(!JobStatus::Cancelled.accepts_write(JobStatus::Cancelled));
        assert!(!JobStatus::Cancelled.accepts_write(JobStatus::Running));
        assert!(JobStatus::Running.accepts_write(JobStatus::Completed));
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&JobStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
        assert_eq!(JobStatus::Running.to_string(), "RUNNING");
    }
}
