use std::sync::Arc;

use parley_graph::ChatOrchestrator;
use parley_persist::PersistClient;

use crate::config::Config;

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub persist: PersistClient,
    pub orchestrator: ChatOrchestrator,
}

impl AppState {
    pub fn new(config: Config, orchestrator: ChatOrchestrator) -> Self {
        Self {
            config: Arc::new(config),
            persist: orchestrator.persist().clone(),
            orchestrator,
        }
    }
}
