//! Vision analysis of one image group.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use super::types::{AnalysisError, AnalysisResult, DetectedFeature, ImageInput};
use crate::completion::{parse_json_response, CompletionClient, CompletionRequest};
use crate::metrics;
use crate::site::Coordinates;

const ANALYSIS_INSTRUCTIONS: &str = "\
You are an expert in archaeological remote sensing. You receive rendered raster products for one candidate site.
Describe what is visible and list every feature that could be human-made, with a confidence between 0 and 1.
Prefer natural explanations unless the pattern is structured (enclosures, mounds, ditches, terraces in a settlement complex).
Respond with a single JSON object and nothing else:
{\"caption\": \"...\", \"tags\": [\"...\"], \"features\": [{\"name\": \"...\", \"confidence\": 0.0, \"description\": \"...\"}]}";

/// Context passed to every group analysis of one site.
#[derive(Debug, Clone)]
pub struct SiteContext<'a> {
    pub site_id: &'a str,
    pub coordinates: Coordinates,
    pub historical_context: Option<&'a str>,
    /// Replaces the default analysis instructions when set.
    pub system_prompt: Option<&'a str>,
}

/// Shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct GroupResponse {
    #[serde(default)]
    caption: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    features: Vec<DetectedFeature>,
}

/// Runs one completion call per image group.
pub struct ImageGroupAnalyzer {
    client: Arc<dyn CompletionClient>,
    max_tokens: u32,
    temperature: f32,
}

impl ImageGroupAnalyzer {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            max_tokens: 2048,
            temperature: 0.0,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Analyze `images` as group `group_name`.
    pub async fn analyze(
        &self,
        site: &SiteContext<'_>,
        group_name: &str,
        images: &[ImageInput],
    ) -> Result<AnalysisResult, AnalysisError> {
        if images.is_empty() {
            return Err(AnalysisError::NoImages(group_name.to_string()));
        }

        let image_urls: Vec<String> = images.iter().map(|i| i.url.clone()).collect();
        let request = CompletionRequest::new(build_group_prompt(site, group_name, images))
            .with_system(
                site.system_prompt
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or(ANALYSIS_INSTRUCTIONS),
            )
            .with_images(image_urls.clone())
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        debug!(
            "Analyzing {} for site {} with {} images",
            group_name,
            site.site_id,
            images.len()
        );

        let timer = metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&["completion", "analyze_group"])
            .start_timer();
        let response = self.client.complete(request).await;
        timer.observe_duration();

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                metrics::IMAGE_ANALYSES_TOTAL
                    .with_label_values(&[group_name, "failed"])
                    .inc();
                return Err(e.into());
            }
        };

        let parsed: GroupResponse = parse_json_response(&response.text).map_err(|e| {
            metrics::IMAGE_ANALYSES_TOTAL
                .with_label_values(&[group_name, "failed"])
                .inc();
            AnalysisError::Malformed(e.to_string())
        })?;

        metrics::IMAGE_ANALYSES_TOTAL
            .with_label_values(&[group_name, "success"])
            .inc();

        let result = AnalysisResult {
            group_name: group_name.to_string(),
            caption: parsed.caption,
            tags: parsed.tags,
            features: parsed
                .features
                .into_iter()
                .map(|mut f| {
                    f.confidence = clamp_confidence(f.confidence);
                    f
                })
                .collect(),
            image_urls,
            is_error: false,
        };

        info!(
            "Completed {} analysis for site {} with caption: {}",
            group_name, site.site_id, result.caption
        );
        Ok(result)
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn build_group_prompt(site: &SiteContext<'_>, group_name: &str, images: &[ImageInput]) -> String {
    let mut out = format!(
        "Site: {}\nCoordinates: {}, {}\nImage group: {}\nImages (in attachment order):\n",
        site.site_id, site.coordinates.latitude, site.coordinates.longitude, group_name
    );
    for (index, image) in images.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", index + 1, image.kind.label()));
    }
    if let Some(history) = site.historical_context.filter(|h| !h.trim().is_empty()) {
        out.push_str(&format!("\nHistorical context:\n{}\n", history.trim()));
    }
    out
}
