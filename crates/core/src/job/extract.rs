//! Metadata extraction: file name + workflow graph -> processing job.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{ProcessFileRequest, ProcessingJob, ProcessingParameters, WorkflowNode};

/// Why a request cannot become a processing job. Terminal for the job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("file name is missing")]
    MissingFileName,

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
}

/// Input families the external processors understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    PointCloud,
    Raster,
    Shapefile,
    E57,
}

impl InputKind {
    /// `extension` includes the leading dot and is matched case-insensitively.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            ".las" | ".laz" => Some(Self::PointCloud),
            ".tif" | ".tiff" => Some(Self::Raster),
            ".shp" => Some(Self::Shapefile),
            ".e57" => Some(Self::E57),
            _ => None,
        }
    }

    /// Name of the completion event the processor raises for this input.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::PointCloud => "LiDARProcessingCompleted",
            Self::Raster => "RasterProcessingCompleted",
            Self::Shapefile => "ShapefileProcessingCompleted",
            Self::E57 => "E57ProcessingCompleted",
        }
    }
}

/// Derive the processing job for `request`.
///
/// The site id is `<stem>_<yyyyMMddHHmmss>` of `now` (UTC); callers pass the
/// instance's start time so a replay derives the same id.
pub fn extract_metadata(
    request: &ProcessFileRequest,
    instance_id: &str,
    now: DateTime<Utc>,
) -> Result<ProcessingJob, ExtractError> {
    if request.file_name.trim().is_empty() {
        warn!("File name is missing in request for instance {}", instance_id);
        return Err(ExtractError::MissingFileName);
    }

    let extension = request.extension().unwrap_or_default();
    let kind = match InputKind::from_extension(&extension) {
        Some(kind) => kind,
        None => {
            warn!("Unsupported file type for file: {}", request.file_name);
            return Err(ExtractError::UnsupportedFileType(request.file_name.clone()));
        }
    };

    let parameters = build_parameters(request, kind);
    let site_id = format!("{}_{}", request.file_stem(), now.format("%Y%m%d%H%M%S"));

    info!(
        "Processing {} as site {} with workflow of {} nodes",
        request.file_name,
        site_id,
        request.workflow.as_ref().map_or(0, Vec::len)
    );

    Ok(ProcessingJob {
        file_name: request.file_name.clone(),
        site_id,
        instance_id: instance_id.to_string(),
        event_name: kind.event_name().to_string(),
        parameters,
    })
}

fn build_parameters(request: &ProcessFileRequest, kind: InputKind) -> ProcessingParameters {
    let mut params = ProcessingParameters::default();
    let options = request.workflow_options.as_ref();

    match kind {
        InputKind::PointCloud => {
            params.resolution = options.and_then(|o| o.resolution).unwrap_or(0.5);
            params.classification_required = true;
        }
        InputKind::E57 => {
            params.resolution = options.and_then(|o| o.resolution).unwrap_or(1.0);
            params.classification_required = options
                .and_then(|o| o.classification_required)
                .unwrap_or(false);
            if let Some(e57) = &request.e57_options {
                params.direct_to_image = e57.direct_to_image.unwrap_or(false);
                if let Some(max) = e57.max_points_per_chunk {
                    params.max_points_per_chunk = max;
                }
            }
        }
        InputKind::Raster | InputKind::Shapefile => {}
    }

    params.coordinates = request.coordinates;

    match request.workflow.as_deref() {
        Some(nodes) if !nodes.is_empty() => {
            params.workflow = nodes.to_vec();
            apply_workflow_features(&mut params, nodes);
            apply_node_parameters(&mut params, nodes);
            apply_imagery_parameters(&mut params, nodes);
        }
        _ => {
            params.generate_dtm = true;
            params.generate_dsm = true;
            params.generate_hillshade = true;
            params.generate_slope = true;
            params.apply_noise_filter = true;
        }
    }

    params
}

fn apply_workflow_features(params: &mut ProcessingParameters, nodes: &[WorkflowNode]) {
    let has = |t: &str| nodes.iter().any(|n| n.node_type == t);
    params.generate_dtm = has("dtm_generator");
    params.generate_dsm = has("dsm_generator");
    params.generate_hillshade = has("hillshade_generator");
    params.generate_slope = has("slope_analyzer");
    params.apply_noise_filter = has("noise_filter");
}

fn apply_node_parameters(params: &mut ProcessingParameters, nodes: &[WorkflowNode]) {
    for node in nodes {
        match node.node_type.as_str() {
            "dtm_generator" => {
                if let Some(v) = node.number("grid_res") {
                    params.dtm_resolution = v;
                }
            }
            "dsm_generator" => {
                if let Some(v) = node.number("grid_res") {
                    params.dsm_resolution = v;
                }
            }
            "lidar_reader" => {
                if let Some(v) = node.number("resolution") {
                    params.resolution = v;
                }
            }
            "hillshade_generator" => {
                if let Some(v) = node.number("azimuth") {
                    params.hillshade_azimuth = v;
                }
                if let Some(v) = node.number("altitude") {
                    params.hillshade_altitude = v;
                }
                if let Some(v) = node.number("z_factor") {
                    params.hillshade_z_factor = v;
                }
            }
            "noise_filter" => {
                if let Some(v) = node.number("std_ratio") {
                    params.noise_filter_std_ratio = v;
                }
                if let Some(v) = node.number("nb_neighbors") {
                    params.noise_filter_neighbors = v;
                }
            }
            "ground_classifier" => {
                if let Some(v) = node.number("grid_size") {
                    params.ground_classifier_cell_size = v;
                }
                if let Some(v) = node.number("z_threshold") {
                    params.ground_classifier_max_distance = v;
                }
            }
            "visualization_options" => {
                if let Some(v) = node.string("dtm_colormap") {
                    params.dtm_colormap = v.to_string();
                }
                if let Some(v) = node.string("dsm_colormap") {
                    params.dsm_colormap = v.to_string();
                }
                if let Some(v) = node.string("hillshade_colormap") {
                    params.hillshade_colormap = v.to_string();
                }
                if let Some(v) = node.boolean("transparent_nodata") {
                    params.transparent_nodata = v;
                }
            }
            "llm_agent_invoker" => {
                if let Some(prompt) = node.string("system_prompt") {
                    params.system_prompt = Some(prompt.to_string());
                }
            }
            t if t.contains("historical_context") && node.inputs.contains_key("files") => {
                debug!("Detected historical context node with context files");
            }
            _ => {}
        }
    }
}

fn apply_imagery_parameters(params: &mut ProcessingParameters, nodes: &[WorkflowNode]) {
    for node in nodes.iter().filter(|n| n.node_type.starts_with("gee_analyzer")) {
        params.apply_imagery = true;

        if let Some(v) = node.string("collection") {
            params.collection = v.to_string();
        }
        if let Some(v) = node.string("analysisType") {
            params.analysis_type = v.to_string();
        }
        if let Some(v) = node.number("bufferDistance") {
            params.buffer_distance = v.max(0.0) as u32;
        }
        // Accepted as either a number or a numeric string.
        let time_range = node.inputs.get("timeRange").and_then(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        });
        if let Some(years) = time_range {
            params.time_range_years = years as u32;
        }
    }
}
