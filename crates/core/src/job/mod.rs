//! Uploaded-file jobs: request types and metadata extraction.

mod extract;
mod types;

pub use extract::{extract_metadata, ExtractError, InputKind};
pub use types::{
    E57Options, ProcessFileRequest, ProcessingJob, ProcessingParameters, WorkflowNode,
    WorkflowOptions,
};
