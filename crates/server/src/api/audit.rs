use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stratum_core::audit::{AuditFilter, AuditRecord};

use crate::state::AppState;

/// Maximum allowed limit for audit queries
const MAX_LIMIT: i64 = 1000;

const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for audit endpoint
#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    pub instance_id: Option<String>,
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    /// Only events at or after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Only events at or before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Default 100, max 1000
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    pub events: Vec<AuditRecord>,
    /// Total number of matching events, ignoring limit and offset
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct AuditErrorResponse {
    pub error: String,
}

type AuditApiError = (StatusCode, Json<AuditErrorResponse>);

fn store_error(action: &str, err: impl std::fmt::Display) -> AuditApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(AuditErrorResponse {
            error: format!("Failed to {} audit events: {}", action, err),
        }),
    )
}

impl AuditQueryParams {
    /// Filter without pagination, shared by the query and the count.
    fn filter(&self) -> AuditFilter {
        let mut filter = AuditFilter::new();
        if let Some(ref instance_id) = self.instance_id {
            filter = filter.with_instance_id(instance_id);
        }
        if let Some(ref event_type) = self.event_type {
            filter = filter.with_event_type(event_type);
        }
        if let Some(ref user_id) = self.user_id {
            filter = filter.with_user_id(user_id);
        }
        if self.from.is_some() || self.to.is_some() {
            filter = filter.with_time_range(self.from, self.to);
        }
        filter
    }
}

/// Query audit events, newest first.
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditQueryResponse>, AuditApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let filter = params.filter();
    let events = state
        .audit_store()
        .query(&filter.clone().with_limit(limit).with_offset(offset))
        .map_err(|e| store_error("query", e))?;
    let total = state
        .audit_store()
        .count(&filter)
        .map_err(|e| store_error("count", e))?;

    Ok(Json(AuditQueryResponse {
        events,
        total,
        limit,
        offset,
    }))
}
