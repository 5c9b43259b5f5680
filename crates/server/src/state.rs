//! Application State
//!
//! Shared state across all handlers. Collaborators are constructed by the
//! caller and injected here; nothing is looked up from globals.

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use std::sync::Arc;

use voice_dialogue_config::Settings;
use voice_dialogue_pipeline::Orchestrator;
use voice_dialogue_transport::StreamSessionManager;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Settings>>,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<StreamSessionManager>,
    /// Prometheus handle, absent when metrics are disabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Settings, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            orchestrator,
            sessions: Arc::new(StreamSessionManager::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Get a read guard to the current configuration
    ///
    /// The guard is not `Send`; copy what you need out before awaiting.
    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }
}
