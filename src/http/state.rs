use crate::session::SessionController;
use crate::telemetry::MetricsStore;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Owner of the single capture session
    pub controller: Arc<SessionController>,

    /// Latest readings fed to the telemetry dispatcher
    pub metrics: MetricsStore,
}

impl AppState {
    pub fn new(controller: Arc<SessionController>, metrics: MetricsStore) -> Self {
        Self {
            controller,
            metrics,
        }
    }
}
