use std::sync::Arc;

use crate::core::config::GateConfig;
use crate::sched::Scheduler;

/// Shared state for the HTTP API.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub config: Arc<GateConfig>,
    pub started_at: std::time::Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("uptime_secs", &self.started_at.elapsed().as_secs())
            .finish()
    }
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>, config: GateConfig) -> Self {
        Self {
            scheduler,
            config: Arc::new(config),
            started_at: std::time::Instant::now(),
        }
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}
