//! Satellite imagery generation.

mod client;
mod suborchestrator;
mod types;

pub use client::{HttpImageryProcessor, ImageryProcessor};
pub use suborchestrator::ImagerySubOrchestrator;
pub use types::{GeneratedImage, ImageryError, ImageryKind, ImageryRequest, SatelliteImagery};
