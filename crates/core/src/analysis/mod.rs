//! Image analysis sub-orchestration.
//!
//! Topography and spectral image groups are analyzed by a vision model,
//! the results are written to the graph, and the topography result seeds a
//! panel deliberation whose verdict decides the site's approval flag.

mod analyzer;
mod suborchestrator;
mod types;

pub use analyzer::{ImageGroupAnalyzer, SiteContext};
pub use suborchestrator::{
    mean_confidence, AnalysisOutcome, AnalysisRequest, AnalysisSubOrchestrator,
};
pub use types::{
    AnalysisError, AnalysisResult, DetectedFeature, ImageInput, ImageKind, ERROR_GROUP,
    SPECTRAL_GROUP, TOPOGRAPHY_GROUP,
};
