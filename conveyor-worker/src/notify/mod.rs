//! Notification layer
//!
//! Delivers status snapshots from the worker to the server process that owns
//! the observer sockets. Delivery is best effort: failures are retried,
//! logged and dropped, and never reach the pipeline.

mod dispatcher;
mod queue;

pub use dispatcher::{NotificationDispatcher, NotifyTransport, RetryPolicy};
pub use queue::DispatchQueue;

use async_trait::async_trait;
use conveyor_core::domain::snapshot::StatusSnapshot;

/// Sink for snapshots produced by the executor
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Hands a snapshot over for delivery; never fails
    async fn notify(&self, snapshot: StatusSnapshot);
}
