//! Site processing orchestration.
//!
//! Each uploaded file becomes one instance of [`SiteProcessingWorkflow`]:
//! - **Extract/Dispatch**: derive the job and hand it to the external processors
//! - **Await**: suspend on the correlation event bus (bounded, cancellable)
//! - **Fan-out**: site node creation alongside satellite imagery generation
//! - **Analysis**: image analysis and panel deliberation, persisted by the
//!   analysis sub-orchestration
//!
//! [`SiteOrchestrator`] hosts the instances as tokio tasks.

mod config;
mod runner;
mod types;
mod workflow;

pub use config::OrchestratorConfig;
pub use runner::SiteOrchestrator;
pub use types::{
    InstanceRecord, InstanceState, JobOutcome, JobStage, OrchestratorError, OrchestratorStatus,
};
pub use workflow::{NoopObserver, SiteProcessingWorkflow, StageObserver};
