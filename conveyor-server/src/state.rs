use conveyor_core::ProgressWeighting;
use conveyor_store::JobStore;
use std::sync::Arc;

use crate::config::Config;
use crate::ws::ConnectionRegistry;

/// Shared application state available to all handlers via `State<AppState>`
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn weighting(&self) -> ProgressWeighting {
        ProgressWeighting::new(self.config.running_step_weight)
    }
}
