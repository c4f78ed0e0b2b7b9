pub mod activities;
pub mod analysis;
pub mod audit;
pub mod completion;
pub mod config;
pub mod deliberation;
pub mod event_bus;
pub mod imagery;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod site;
pub mod testing;

pub use audit::{create_audit_system, AuditEvent, AuditHandle, AuditStore, MemoryAuditStore};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use event_bus::{CorrelationEventBus, HttpWorkQueue, ProcessingResult, WorkQueue};
pub use job::ProcessFileRequest;
pub use orchestrator::{
    InstanceRecord, InstanceState, JobStage, OrchestratorConfig, OrchestratorError,
    SiteOrchestrator, SiteProcessingWorkflow,
};
