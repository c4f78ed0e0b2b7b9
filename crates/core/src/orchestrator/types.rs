//! Types for the site processing orchestrator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activities::ActivityError;
use crate::analysis::AnalysisOutcome;
use crate::event_bus::EventBusError;

/// Errors that end an instance as failed, or reject a host operation.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("dispatch failed: {0}")]
    Dispatch(EventBusError),

    #[error("no completion event for {key} within {timeout:?}")]
    ExternalEventTimeout { key: String, timeout: Duration },

    #[error("instance {0} was cancelled")]
    Cancelled(String),

    #[error("activity failed: {0}")]
    Activity(#[from] ActivityError),

    #[error("event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("a job for file {0} is already in flight")]
    DuplicateJob(String),

    #[error("instance not found: {0}")]
    InstanceNotFound(String),

    #[error("instance limit reached ({0} running)")]
    AtCapacity(usize),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("orchestrator is stopped")]
    Stopped,
}

/// Where an instance is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Submitted,
    Extract,
    Dispatch,
    AwaitExternal,
    Fanout,
    PersistRasterResults,
    Analysis,
    Done,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Extract => "extract",
            Self::Dispatch => "dispatch",
            Self::AwaitExternal => "await_external",
            Self::Fanout => "fanout",
            Self::PersistRasterResults => "persist_raster_results",
            Self::Analysis => "analysis",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Running,
    Completed,
    Unsupported,
    Aborted,
    Failed,
    Cancelled,
}

impl InstanceState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Unsupported => "unsupported",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How a workflow run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed {
        site_id: String,
        analysis: Option<AnalysisOutcome>,
    },
    /// The file type has no processor; nothing was dispatched.
    Unsupported { file_name: String },
    /// The processors failed or produced no usable coordinates.
    Aborted { reason: String },
}

impl JobOutcome {
    pub fn state(&self) -> InstanceState {
        match self {
            Self::Completed { .. } => InstanceState::Completed,
            Self::Unsupported { .. } => InstanceState::Unsupported,
            Self::Aborted { .. } => InstanceState::Aborted,
        }
    }
}

/// Host bookkeeping for one instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub file_name: String,
    pub user_id: Option<String>,
    pub site_id: Option<String>,
    pub stage: JobStage,
    pub state: InstanceState,
    /// Abort reason or failure message.
    pub error: Option<String>,
    pub analysis: Option<AnalysisOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceRecord {
    pub fn new(
        instance_id: impl Into<String>,
        file_name: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            instance_id: instance_id.into(),
            file_name: file_name.into(),
            user_id,
            site_id: None,
            stage: JobStage::Submitted,
            state: InstanceState::Running,
            error: None,
            analysis: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    pub total: usize,
    pub running_count: usize,
    pub completed_count: usize,
    pub unsupported_count: usize,
    pub aborted_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
    /// Correlation keys still registered on the event bus.
    pub pending_events: usize,
}
