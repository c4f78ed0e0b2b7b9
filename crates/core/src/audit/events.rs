use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Job lifecycle
    JobSubmitted {
        instance_id: String,
        file_name: String,
        user_id: Option<String>,
    },
    JobStageChanged {
        instance_id: String,
        site_id: Option<String>,
        from_stage: String,
        to_stage: String,
    },
    JobDispatched {
        instance_id: String,
        site_id: String,
        event_name: String,
    },
    ExternalEventReceived {
        instance_id: String,
        event_name: String,
        status: String,
        waited_secs: f64,
    },
    ImageryCompleted {
        instance_id: String,
        site_id: String,
        generated: usize,
    },
    AnalysisCompleted {
        instance_id: String,
        site_id: String,
        groups: Vec<String>,
        mean_confidence: f64,
        verdict: String,
        turns: usize,
    },

    // Terminal states
    JobCompleted {
        instance_id: String,
        site_id: String,
    },
    JobUnsupported {
        instance_id: String,
        file_name: String,
    },
    JobAborted {
        instance_id: String,
        site_id: Option<String>,
        reason: String,
    },
    JobFailed {
        instance_id: String,
        error: String,
    },
    JobCancelled {
        instance_id: String,
        stage: String,
    },
}

impl AuditEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::JobSubmitted { .. } => "job_submitted",
            Self::JobStageChanged { .. } => "job_stage_changed",
            Self::JobDispatched { .. } => "job_dispatched",
            Self::ExternalEventReceived { .. } => "external_event_received",
            Self::ImageryCompleted { .. } => "imagery_completed",
            Self::AnalysisCompleted { .. } => "analysis_completed",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobUnsupported { .. } => "job_unsupported",
            Self::JobAborted { .. } => "job_aborted",
            Self::JobFailed { .. } => "job_failed",
            Self::JobCancelled { .. } => "job_cancelled",
        }
    }

    /// Get the orchestration instance this event belongs to, if any
    pub fn instance_id(&self) -> Option<&str> {
        match self {
            Self::JobSubmitted { instance_id, .. }
            | Self::JobStageChanged { instance_id, .. }
            | Self::JobDispatched { instance_id, .. }
            | Self::ExternalEventReceived { instance_id, .. }
            | Self::ImageryCompleted { instance_id, .. }
            | Self::AnalysisCompleted { instance_id, .. }
            | Self::JobCompleted { instance_id, .. }
            | Self::JobUnsupported { instance_id, .. }
            | Self::JobAborted { instance_id, .. }
            | Self::JobFailed { instance_id, .. }
            | Self::JobCancelled { instance_id, .. } => Some(instance_id),
            Self::ServiceStarted { .. } | Self::ServiceStopped { .. } => None,
        }
    }

    /// Get the user that caused this event, if any
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::JobSubmitted { user_id, .. } => user_id.as_deref(),
            _ => None,
        }
    }
}

/// A stored audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub instance_id: Option<String>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}
