//! Orchestrator API handlers.

use axum::{extract::State, Json};
use std::sync::Arc;
use stratum_core::orchestrator::OrchestratorStatus;

use crate::state::AppState;

/// Instance counts by state plus the pending correlation keys.
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatus> {
    Json(state.orchestrator().status().await)
}
