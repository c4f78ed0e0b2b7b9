//! Candidate sites and the persistence collaborators that store them.

mod memory;
mod store;
mod types;

pub use memory::MemorySiteStore;
pub use store::{GraphStore, Leaderboard, SiteRepository, StoreError, TranscriptStore};
pub use types::{
    Coordinates, Discovery, GraphNode, GraphRelationship, PointsAward, SiteComponent, SiteRecord,
    SiteStatus, UserRef, SITE_LABEL,
};
