//! Stage activities.
//!
//! Each activity wraps exactly one external call and is safe to re-run with
//! the same input.

mod error;
mod stage;

pub use error::ActivityError;
pub use stage::{
    is_published_locator, transcript_session_id, Activities, RelationshipReport, ANALYSIS_LABEL,
    FEATURE_LABEL,
};
