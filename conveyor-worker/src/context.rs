//! Worker context
//!
//! Shared collaborators handed to every job the worker executes.

use conveyor_core::ProgressWeighting;
use conveyor_core::domain::snapshot::StatusSnapshot;
use conveyor_store::{JobStore, status};
use std::sync::Arc;
use tracing::warn;

use crate::notify::Notifier;

pub struct WorkerContext {
    pub store: Arc<dyn JobStore>,
    pub notifier: Arc<dyn Notifier>,
    pub weighting: ProgressWeighting,
}

impl WorkerContext {
    pub fn new(
        store: Arc<dyn JobStore>,
        notifier: Arc<dyn Notifier>,
        weighting: ProgressWeighting,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            notifier,
            weighting,
        })
    }

    /// Recomputes the job aggregate from its steps and hands the snapshot to
    /// the notifier.
    ///
    /// Failures are logged and swallowed; a missed snapshot is superseded by
    /// the next one.
    pub async fn publish(&self, job_id: &str) -> Option<StatusSnapshot> {
        match status::snapshot(self.store.as_ref(), job_id, self.weighting).await {
            Ok(snapshot) => {
                self.notifier.notify(snapshot.clone()).await;
                Some(snapshot)
            }
            Err(e) => {
                warn!(job_id = %job_id, "Failed to build status snapshot: {}", e);
                None
            }
        }
    }
}
