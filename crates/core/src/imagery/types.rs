//! Satellite imagery requests and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::ProcessingParameters;
use crate::site::Coordinates;

/// The three products generated per site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageryKind {
    Ndvi,
    TrueColor,
    FalseColor,
}

impl ImageryKind {
    pub const ALL: [ImageryKind; 3] = [Self::Ndvi, Self::TrueColor, Self::FalseColor];

    /// Path segment on the imagery processor.
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            Self::Ndvi => "ndvi",
            Self::TrueColor => "true_color",
            Self::FalseColor => "false_color",
        }
    }

    /// Name of the site component the image is attached as.
    pub fn component_name(&self) -> &'static str {
        match self {
            Self::Ndvi => "NDVI",
            Self::TrueColor => "True Color Satellite",
            Self::FalseColor => "False Color Satellite",
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.endpoint_path()
    }
}

/// Input to one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageryRequest {
    pub site_id: String,
    pub coordinates: Coordinates,
    pub collection: String,
    pub analysis_type: String,
    pub buffer_distance: u32,
    pub time_range_years: u32,
    pub request_id: String,
}

impl ImageryRequest {
    pub fn new(site_id: impl Into<String>, coordinates: Coordinates) -> Self {
        Self::from_parameters(site_id, coordinates, &ProcessingParameters::default())
    }

    pub fn from_parameters(
        site_id: impl Into<String>,
        coordinates: Coordinates,
        params: &ProcessingParameters,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            coordinates,
            collection: params.collection.clone(),
            analysis_type: params.analysis_type.clone(),
            buffer_distance: params.buffer_distance,
            time_range_years: params.time_range_years,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// One generated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    #[serde(default)]
    pub image_type: String,
    pub image_url: String,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub processed_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Aggregate of the three generation calls; any subset may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteImagery {
    pub site_id: String,
    pub ndvi_url: Option<String>,
    pub true_color_url: Option<String>,
    pub false_color_url: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl SatelliteImagery {
    pub fn url(&self, kind: ImageryKind) -> Option<&str> {
        match kind {
            ImageryKind::Ndvi => self.ndvi_url.as_deref(),
            ImageryKind::TrueColor => self.true_color_url.as_deref(),
            ImageryKind::FalseColor => self.false_color_url.as_deref(),
        }
    }

    pub fn generated_count(&self) -> usize {
        ImageryKind::ALL
            .iter()
            .filter(|k| self.url(**k).is_some())
            .count()
    }
}

/// Errors from the imagery processor.
#[derive(Debug, Error)]
pub enum ImageryError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("processor returned {status}: {message}")]
    Processor { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid coordinates (0,0) for site {0}")]
    InvalidCoordinates(String),
}
