//! Records exchanged with the external processors.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{ProcessingJob, ProcessingParameters};
use crate::site::Coordinates;

/// Identifies the one completion event an instance is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationKey {
    pub instance_id: String,
    pub event_name: String,
}

impl CorrelationKey {
    pub fn new(instance_id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            event_name: event_name.into(),
        }
    }

    pub fn for_job(job: &ProcessingJob) -> Self {
        Self::new(job.instance_id.clone(), job.event_name.clone())
    }
}

impl std::fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.instance_id, self.event_name)
    }
}

/// Message published to the work queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub instance_id: String,
    pub event_name: String,
    pub blob_uri: String,
    pub site_id: String,
    pub parameters: ProcessingParameters,
}

impl JobDescriptor {
    pub fn from_job(job: &ProcessingJob, blob_container_url: &str) -> Self {
        Self {
            instance_id: job.instance_id.clone(),
            event_name: job.event_name.clone(),
            blob_uri: format!(
                "{}/{}",
                blob_container_url.trim_end_matches('/'),
                job.file_name
            ),
            site_id: job.site_id.clone(),
            parameters: job.parameters.clone(),
        }
    }
}

/// Payload of the completion event raised by an external processor.
///
/// The schema belongs to the processors, so every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingResult {
    pub status: String,
    pub output_dir: Option<String>,
    pub error_message: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub dtm_image: Option<String>,
    pub dsm_image: Option<String>,
    pub hillshade_image: Option<String>,
    pub hillshade_multi_directional_image: Option<String>,
    pub slope_image: Option<String>,
    pub historical_context: Option<String>,
    pub system_prompt: Option<String>,
    pub statistics: Option<serde_json::Map<String, serde_json::Value>>,
    pub blob_urls: HashMap<String, String>,
}

impl ProcessingResult {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

/// Errors from the correlation event bus.
#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("correlation {0} is already in flight")]
    DuplicateCorrelation(CorrelationKey),

    #[error("no job in flight for correlation {0}")]
    UnknownCorrelation(CorrelationKey),

    #[error("event for correlation {0} was already delivered")]
    DuplicateEvent(CorrelationKey),

    #[error("correlation {0} already has a waiter")]
    AlreadyAwaiting(CorrelationKey),

    #[error("timed out after {timeout:?} waiting for {key}")]
    Timeout {
        key: CorrelationKey,
        timeout: Duration,
    },

    #[error("wait for {0} was cancelled")]
    Cancelled(CorrelationKey),

    #[error("dispatch failed: {0}")]
    Dispatch(#[from] QueueError),

    #[error("event channel closed for {0}")]
    Closed(CorrelationKey),
}

/// Errors from publishing to the work queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("queue rejected job: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}
