//! Image-group analysis results.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activities::ActivityError;
use crate::completion::LlmError;

pub const TOPOGRAPHY_GROUP: &str = "TopographyGroup";
pub const SPECTRAL_GROUP: &str = "SpectralGroup";
/// Group name used when image analysis failed as a whole.
pub const ERROR_GROUP: &str = "Error";

/// Raster products the analysis can look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Hillshade,
    HillshadeMultiDirectional,
    Slope,
    Dtm,
    Dsm,
    Ndvi,
    TrueColor,
    FalseColor,
}

impl ImageKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hillshade => "Hillshade",
            Self::HillshadeMultiDirectional => "Hillshade Multi-Directional",
            Self::Slope => "Slope",
            Self::Dtm => "Digital Terrain Model",
            Self::Dsm => "Digital Surface Model",
            Self::Ndvi => "NDVI",
            Self::TrueColor => "True Color",
            Self::FalseColor => "False Color",
        }
    }

    pub fn is_spectral(&self) -> bool {
        matches!(self, Self::Ndvi | Self::TrueColor | Self::FalseColor)
    }
}

/// One image handed to the vision model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInput {
    pub kind: ImageKind,
    pub url: String,
}

impl ImageInput {
    pub fn new(kind: ImageKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
        }
    }
}

/// A feature the vision model reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFeature {
    pub name: String,
    /// In `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub description: String,
}

/// Result for one image group. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub features: Vec<DetectedFeature>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// True for placeholders recorded in place of a failed analysis.
    #[serde(default)]
    pub is_error: bool,
}

impl AnalysisResult {
    /// Placeholder stored instead of propagating an analysis failure.
    pub fn error(group_name: impl Into<String>, message: &str) -> Self {
        Self {
            group_name: group_name.into(),
            caption: "Error during analysis".to_string(),
            tags: vec!["error".to_string()],
            features: vec![DetectedFeature {
                name: "Error".to_string(),
                confidence: 0.0,
                description: message.to_string(),
            }],
            image_urls: Vec::new(),
            is_error: true,
        }
    }
}

/// Errors from a group analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no eligible images for {0}")]
    NoImages(String),

    #[error("completion failed: {0}")]
    Completion(#[from] LlmError),

    #[error("malformed analysis response: {0}")]
    Malformed(String),

    #[error("activity failed: {0}")]
    Activity(#[from] ActivityError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_placeholder() {
        let result = AnalysisResult::error(TOPOGRAPHY_GROUP, "boom");
        assert!(result.is_error);
        assert_eq!(result.caption, "Error during analysis");
        assert_eq!(result.features[0].confidence, 0.0);
        assert_eq!(result.features[0].description, "boom");
    }

    #[test]
    fn test_result_tolerates_missing_fields() {
        let result: AnalysisResult =
            serde_json::from_str(r#"{"caption":"terraces","features":[{"name":"wall"}]}"#)
                .unwrap();
        assert_eq!(result.caption, "terraces");
        assert!(result.tags.is_empty());
        assert_eq!(result.features[0].confidence, 0.0);
        assert!(!result.is_error);
    }

    #[test]
    fn test_spectral_kinds() {
        assert!(ImageKind::Ndvi.is_spectral());
        assert!(!ImageKind::Dtm.is_spectral());
    }
}
