//! Persistence seams for sites, graph relationships, transcripts and scores.
//!
//! Every write is an upsert keyed by a stable id so activities can be
//! re-executed with the same input without duplicating data.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{
    Discovery, GraphNode, GraphRelationship, PointsAward, SiteComponent, SiteRecord, SiteStatus,
};
use crate::deliberation::Transcript;

/// Errors from persistence collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("site not found: {0}")]
    SiteNotFound(String),

    #[error("node not found: {label} {key}")]
    NodeNotFound { label: String, key: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Site documents.
#[async_trait]
pub trait SiteRepository: Send + Sync {
    /// Create or replace the site record; existing components are kept.
    async fn upsert_site(&self, site: &SiteRecord) -> Result<(), StoreError>;

    async fn get_site(&self, site_id: &str) -> Result<Option<SiteRecord>, StoreError>;

    /// Attach components, replacing any with the same name.
    async fn attach_components(
        &self,
        site_id: &str,
        components: &[SiteComponent],
    ) -> Result<(), StoreError>;

    async fn set_approval_status(&self, site_id: &str, approved: bool) -> Result<(), StoreError>;

    async fn set_status(&self, site_id: &str, status: SiteStatus) -> Result<(), StoreError>;
}

/// Graph of sites, analysis results and detected features.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_node(&self, node: &GraphNode) -> Result<(), StoreError>;

    /// Both endpoints must already exist.
    async fn upsert_relationship(&self, relationship: &GraphRelationship)
        -> Result<(), StoreError>;
}

/// Deliberation transcripts, one session per site.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Replace the session's transcript.
    async fn save_transcript(
        &self,
        session_id: &str,
        site_id: &str,
        user_id: Option<&str>,
        transcript: &Transcript,
    ) -> Result<(), StoreError>;

    async fn get_transcript(&self, session_id: &str) -> Result<Option<Transcript>, StoreError>;
}

/// User scoring.
#[async_trait]
pub trait Leaderboard: Send + Sync {
    /// Record a discovery; keyed by `(user, site)`.
    async fn add_discovery(&self, user_id: &str, discovery: &Discovery)
        -> Result<(), StoreError>;

    /// Grant points; keyed by `(user, award.key)`.
    async fn award_points(&self, user_id: &str, award: &PointsAward) -> Result<(), StoreError>;

    async fn total_points(&self, user_id: &str) -> Result<u64, StoreError>;
}
