//! Upload requests, workflow graphs and the processing parameters derived
//! from them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::site::{Coordinates, UserRef};

/// Request to process one uploaded file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessFileRequest {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
    /// User-authored node graph; `None` means "generate everything".
    #[serde(default)]
    pub workflow: Option<Vec<WorkflowNode>>,
    #[serde(default)]
    pub workflow_options: Option<WorkflowOptions>,
    #[serde(default)]
    pub e57_options: Option<E57Options>,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

impl ProcessFileRequest {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: UserRef) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_coordinates(mut self, coordinates: Coordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_workflow(mut self, workflow: Vec<WorkflowNode>) -> Self {
        self.workflow = Some(workflow);
        self
    }

    /// File name without its final extension.
    pub fn file_stem(&self) -> &str {
        match self.file_name.rfind('.') {
            Some(idx) if idx > 0 => &self.file_name[..idx],
            _ => &self.file_name,
        }
    }

    /// Lower-cased extension including the leading dot, if any.
    pub fn extension(&self) -> Option<String> {
        match self.file_name.rfind('.') {
            Some(idx) if idx > 0 && idx + 1 < self.file_name.len() => {
                Some(self.file_name[idx..].to_ascii_lowercase())
            }
            _ => None,
        }
    }
}

/// Options applying to the whole workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowOptions {
    #[serde(default)]
    pub resolution: Option<f64>,
    #[serde(default)]
    pub classification_required: Option<bool>,
}

/// Options specific to E57 point clouds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct E57Options {
    #[serde(default)]
    pub direct_to_image: Option<bool>,
    #[serde(default)]
    pub max_points_per_chunk: Option<u64>,
}

/// One node of the user-authored processing graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub inputs: HashMap<String, serde_json::Value>,
}

impl WorkflowNode {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            inputs: HashMap::new(),
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(key.into(), value);
        self
    }

    pub(crate) fn number(&self, key: &str) -> Option<f64> {
        self.inputs.get(key).and_then(|v| v.as_f64())
    }

    pub(crate) fn string(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(|v| v.as_str())
    }

    pub(crate) fn boolean(&self, key: &str) -> Option<bool> {
        self.inputs.get(key).and_then(|v| v.as_bool())
    }
}

/// Parameters handed to the external raster processors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingParameters {
    pub resolution: f64,
    pub classification_required: bool,
    pub direct_to_image: bool,
    pub generate_dtm: bool,
    pub generate_dsm: bool,
    pub generate_hillshade: bool,
    pub generate_slope: bool,
    pub apply_noise_filter: bool,
    pub apply_imagery: bool,
    pub dtm_resolution: f64,
    pub dsm_resolution: f64,
    pub hillshade_azimuth: f64,
    pub hillshade_altitude: f64,
    pub hillshade_z_factor: f64,
    pub noise_filter_std_ratio: f64,
    pub noise_filter_neighbors: f64,
    pub ground_classifier_cell_size: f64,
    pub ground_classifier_max_distance: f64,
    pub dtm_colormap: String,
    pub dsm_colormap: String,
    pub hillshade_colormap: String,
    pub transparent_nodata: bool,
    pub max_points_per_chunk: u64,
    /// Overrides the analysis system prompt when set.
    pub system_prompt: Option<String>,
    pub collection: String,
    pub analysis_type: String,
    pub buffer_distance: u32,
    pub time_range_years: u32,
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workflow: Vec<WorkflowNode>,
}

impl Default for ProcessingParameters {
    fn default() -> Self {
        Self {
            resolution: 0.5,
            classification_required: false,
            direct_to_image: false,
            generate_dtm: false,
            generate_dsm: false,
            generate_hillshade: false,
            generate_slope: false,
            apply_noise_filter: false,
            apply_imagery: false,
            dtm_resolution: 0.5,
            dsm_resolution: 0.5,
            hillshade_azimuth: 315.0,
            hillshade_altitude: 45.0,
            hillshade_z_factor: 1.0,
            noise_filter_std_ratio: 2.0,
            noise_filter_neighbors: 8.0,
            ground_classifier_cell_size: 1.0,
            ground_classifier_max_distance: 2.5,
            dtm_colormap: "gray".to_string(),
            dsm_colormap: "terrain".to_string(),
            hillshade_colormap: "gray".to_string(),
            transparent_nodata: true,
            max_points_per_chunk: 5_000_000,
            system_prompt: None,
            collection: "LANDSAT/LC08/C02/T1_TOA".to_string(),
            analysis_type: "ndvi".to_string(),
            buffer_distance: 1000,
            time_range_years: 1,
            coordinates: None,
            workflow: Vec::new(),
        }
    }
}

/// A job after metadata extraction. Owned by exactly one orchestration
/// instance; `(instance_id, event_name)` is its correlation key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub file_name: String,
    pub site_id: String,
    pub instance_id: String,
    pub event_name: String,
    pub parameters: ProcessingParameters,
}
