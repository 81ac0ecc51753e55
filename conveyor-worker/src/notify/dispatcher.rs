//! Notification dispatcher
//!
//! Pushes a snapshot through a [`NotifyTransport`] with bounded retries and
//! exponential backoff.

use anyhow::Result;
use async_trait::async_trait;
use conveyor_client::ServerClient;
use conveyor_core::domain::snapshot::StatusSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::Notifier;

/// Transport that carries a snapshot to the serving process
#[async_trait]
pub trait NotifyTransport: Send + Sync {
    /// Returns the number of observers the server reached
    async fn push(&self, snapshot: &StatusSnapshot) -> Result<usize>;
}

#[async_trait]
impl NotifyTransport for ServerClient {
    async fn push(&self, snapshot: &StatusSnapshot) -> Result<usize> {
        let response = self.notify(snapshot).await?;
        Ok(response.notified)
    }
}

/// Retry policy for snapshot delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based): 1x, 2x, 4x the initial backoff
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Best-effort delivery of snapshots to the server
pub struct NotificationDispatcher {
    transport: Arc<dyn NotifyTransport>,
    policy: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn NotifyTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// Delivers a snapshot, retrying with backoff.
    ///
    /// Returns `false` once every attempt failed. Never returns an error.
    pub async fn dispatch(&self, job_id: &str, snapshot: &StatusSnapshot) -> bool {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.transport.push(snapshot).await {
                Ok(notified) => {
                    debug!(
                        job_id = %job_id,
                        status = %snapshot.status,
                        attempt,
                        notified,
                        "Snapshot delivered"
                    );
                    return true;
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        job_id = %job_id,
                        attempt,
                        max_attempts,
                        "Snapshot delivery failed, retrying in {:?}: {:#}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        job_id = %job_id,
                        status = %snapshot.status,
                        max_attempts,
                        "Giving up on snapshot delivery: {:#}",
                        e
                    );
                }
            }
        }

        false
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    async fn notify(&self, snapshot: StatusSnapshot) {
        self.dispatch(&snapshot.job_id, &snapshot).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::domain::job::{Job, JobStatus};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` pushes, then succeeds
    struct FlakyTransport {
        failures: u32,
        calls: AtomicU32,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl NotifyTransport for FlakyTransport {
        async fn push(&self, _snapshot: &StatusSnapshot) -> Result<usize> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                anyhow::bail!("connection refused");
            }
            Ok(1)
        }
    }

    fn snapshot() -> StatusSnapshot {
        let job = Job {
            id: "job-1".to_string(),
            name: "ingest".to_string(),
            job_type: "document".to_string(),
            owner_id: "alice".to_string(),
            status: JobStatus::Running,
            progress: 50,
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

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_dispatch_succeeds_after_retry() {
        let transport = Arc::new(FlakyTransport::new(2));
        let dispatcher = NotificationDispatcher::new(transport.clone(), fast_policy());

        assert!(dispatcher.dispatch("job-1", &snapshot()).await);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dispatch_gives_up_after_max_attempts() {
        let transport = Arc::new(FlakyTransport::new(u32::MAX));
        let dispatcher = NotificationDispatcher::new(transport.clone(), fast_policy());

        assert!(!dispatcher.dispatch("job-1", &snapshot()).await);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_dispatch_gives_up_when_server_never_answers() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let client = ServerClient::with_timeout(format!("http://{}", addr), Duration::from_millis(100))
            .unwrap()
            .with_api_key("secret");
        let dispatcher = NotificationDispatcher::new(Arc::new(client), fast_policy());

        let delivered = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher.dispatch("job-1", &snapshot()),
        )
        .await
        .expect("dispatch should finish within its attempt budget");

        assert!(!delivered);
        server.abort();
    }
}
