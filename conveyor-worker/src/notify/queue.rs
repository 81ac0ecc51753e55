//! Outbound dispatch queue
//!
//! The executor enqueues snapshots in step order; one long-lived task drains
//! the queue through the dispatcher, so retry backoff never stalls a pipeline.
//! Intermediate snapshots are dropped when the queue is full. A terminal
//! snapshot waits for room instead, so the final state of a job is always
//! attempted after its earlier ones.

use async_trait::async_trait;
use conveyor_core::domain::snapshot::StatusSnapshot;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{NotificationDispatcher, Notifier};

pub struct DispatchQueue {
    sender: mpsc::Sender<StatusSnapshot>,
}

impl DispatchQueue {
    /// Spawns the consumer task.
    ///
    /// The task exits once every `DispatchQueue` handle is dropped and the
    /// queue is drained; await the returned handle to flush on shutdown.
    pub fn spawn(dispatcher: NotificationDispatcher, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<StatusSnapshot>(capacity.max(1));

        let handle = tokio::spawn(async move {
            while let Some(snapshot) = receiver.recv().await {
                dispatcher.dispatch(&snapshot.job_id, &snapshot).await;
            }
            debug!("Dispatch queue drained");
        });

        (Self { sender }, handle)
    }
}

#[async_trait]
impl Notifier for DispatchQueue {
    async fn notify(&self, snapshot: StatusSnapshot) {
        match self.sender.try_send(snapshot) {
            Ok(()) => {}
            Err(TrySendError::Full(snapshot)) if snapshot.is_terminal() => {
                debug!(job_id = %snapshot.job_id, "Dispatch queue full, waiting to enqueue final snapshot");
                if let Err(e) = self.sender.send(snapshot).await {
                    warn!(job_id = %e.0.job_id, "Dispatch queue closed, dropping final snapshot");
                }
            }
            Err(TrySendError::Full(snapshot)) => {
                warn!(job_id = %snapshot.job_id, "Dispatch queue full, dropping snapshot");
            }
            Err(TrySendError::Closed(snapshot)) => {
                warn!(job_id = %snapshot.job_id, "Dispatch queue closed, dropping snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NotifyTransport, RetryPolicy};
    use conveyor_core::domain::job::{Job, JobStatus};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingTransport {
        seen: Mutex<Vec<(String, JobStatus)>>,
    }

    #[async_trait]
    impl NotifyTransport for RecordingTransport {
        async fn push(&self, snapshot: &StatusSnapshot) -> anyhow::Result<usize> {
            self.seen
                .lock()
                .unwrap()
                .push((snapshot.job_id.clone(), snapshot.status));
            Ok(1)
        }
    }

    fn snapshot(status: JobStatus) -> StatusSnapshot {
        let job = Job {
            id: "job-1".to_string(),
            name: "ingest".to_string(),
            job_type: "document".to_string(),
            owner_id: "alice".to_string(),
            status,
            progress: 0,
            error_message: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            metadata: Default::default(),
            input: serde_json::Value::Null,
            worker_id: None,
        };
        StatusSnapshot::new(&job, &[])
    }

    #[tokio::test]
    async fn test_queue_preserves_order_and_drains_on_drop() {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = NotificationDispatcher::new(
            transport.clone(),
            RetryPolicy {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
            },
        );
        let (queue, handle) = DispatchQueue::spawn(dispatcher, 8);

        queue.notify(snapshot(JobStatus::Running)).await;
        queue.notify(snapshot(JobStatus::Completed)).await;
        drop(queue);
        handle.await.unwrap();

        let seen = transport.seen.lock().unwrap();
        let statuses: Vec<JobStatus> = seen.iter().map(|(_, s)| *s).collect();
        assert_eq!(statuses, vec![JobStatus::Running, JobStatus::Completed]);
    }

    /// Sleeps on every push so the queue backs up
    struct SlowTransport {
        delay: Duration,
        seen: Mutex<Vec<JobStatus>>,
    }

    #[async_trait]
    impl NotifyTransport for SlowTransport {
        async fn push(&self, snapshot: &StatusSnapshot) -> anyhow::Result<usize> {
            tokio::time::sleep(self.delay).await;
            self.seen.lock().unwrap().push(snapshot.status);
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_full_queue_still_delivers_final_snapshot() {
        let transport = Arc::new(SlowTransport {
            delay: Duration::from_millis(100),
            seen: Mutex::new(Vec::new()),
        });
        let dispatcher = NotificationDispatcher::new(
            transport.clone(),
            RetryPolicy {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
            },
        );
        let (queue, handle) = DispatchQueue::spawn(dispatcher, 1);

        queue.notify(snapshot(JobStatus::Running)).await;
        queue.notify(snapshot(JobStatus::Running)).await;
        queue.notify(snapshot(JobStatus::Running)).await;
        queue.notify(snapshot(JobStatus::Completed)).await;
        drop(queue);
        handle.await.unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&JobStatus::Completed));
        assert_eq!(
            seen.iter().filter(|s| **s == JobStatus::Completed).count(),
            1
        );
        assert!(seen.len() < 4);
    }
}
