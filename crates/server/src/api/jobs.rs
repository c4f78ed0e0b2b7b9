//! Job intake and external event API handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stratum_core::event_bus::EventBusError;
use stratum_core::{
    InstanceRecord, InstanceState, OrchestratorError, ProcessFileRequest, ProcessingResult,
};
use tracing::{info, warn};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub instance_id: String,
    pub file_name: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<InstanceRecord>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Only instances in this state (`running`, `completed`, ...)
    pub state: Option<InstanceState>,
}

type ApiError = (StatusCode, Json<JobErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(JobErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map orchestrator errors onto HTTP status codes.
fn error_response(err: OrchestratorError) -> ApiError {
    let status = match &err {
        OrchestratorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::EventBus(
            EventBusError::UnknownCorrelation(_) | EventBusError::Closed(_),
        ) => StatusCode::NOT_FOUND,
        OrchestratorError::DuplicateJob(_)
        | OrchestratorError::EventBus(EventBusError::DuplicateEvent(_)) => StatusCode::CONFLICT,
        OrchestratorError::Stopped | OrchestratorError::AtCapacity(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a site processing instance for an uploaded file.
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ProcessFileRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), ApiError> {
    let Json(request) = payload
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid request: {}", e)))?;
    let file_name = request.file_name.clone();

    let instance_id = state
        .orchestrator()
        .submit(request)
        .await
        .map_err(error_response)?;

    info!("Accepted job {} for {}", instance_id, file_name);
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            instance_id,
            message: format!("Processing started for {}", file_name),
            file_name,
        }),
    ))
}

/// List instances, newest first.
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Json<JobListResponse> {
    let jobs: Vec<InstanceRecord> = state
        .orchestrator()
        .list()
        .await
        .into_iter()
        .filter(|record| params.state.map_or(true, |s| record.state == s))
        .collect();
    let total = jobs.len();
    Json(JobListResponse { jobs, total })
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<InstanceRecord>, ApiError> {
    state
        .orchestrator()
        .instance(&id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Job not found: {}", id)))
}

/// Request cancellation. The instance ends `cancelled` at its next checkpoint.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state
        .orchestrator()
        .cancel(&id)
        .await
        .map_err(error_response)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: format!("Cancellation requested for {}", id),
        }),
    ))
}

/// Deliver an external processor's completion event.
pub async fn raise_event(
    State(state): State<Arc<AppState>>,
    Path((id, event_name)): Path<(String, String)>,
    payload: Result<Json<ProcessingResult>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(result) = payload
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid event: {}", e)))?;

    if let Err(e) = state
        .orchestrator()
        .raise_event(&id, &event_name, result)
        .await
    {
        warn!("Event {} for job {} rejected: {}", event_name, id, e);
        return Err(error_response(e));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: format!("{} delivered to {}", event_name, id),
        }),
    ))
}
