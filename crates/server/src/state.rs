use std::sync::Arc;
use stratum_core::{AuditStore, Config, SanitizedConfig, SiteOrchestrator};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<SiteOrchestrator>,
    audit_store: Arc<dyn AuditStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Arc<SiteOrchestrator>,
        audit_store: Arc<dyn AuditStore>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            audit_store,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &Arc<SiteOrchestrator> {
        &self.orchestrator
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }
}
