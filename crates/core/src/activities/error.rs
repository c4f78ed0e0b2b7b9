//! Activity error type.

use thiserror::Error;

use crate::site::StoreError;

/// Errors from a stage activity.
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid activity input: {0}")]
    InvalidInput(String),
}
