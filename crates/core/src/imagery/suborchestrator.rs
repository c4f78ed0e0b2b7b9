//! Fan-out over the three satellite products.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::client::ImageryProcessor;
use super::types::{ImageryKind, ImageryRequest, SatelliteImagery};
use crate::activities::Activities;
use crate::metrics;
use crate::site::Coordinates;

/// Generates NDVI, true-color and false-color images concurrently and
/// attaches whatever succeeded to the site.
///
/// Never fails the caller: every problem is logged and reported as `None`.
pub struct ImagerySubOrchestrator {
    processor: Arc<dyn ImageryProcessor>,
    activities: Activities,
}

impl ImagerySubOrchestrator {
    pub fn new(processor: Arc<dyn ImageryProcessor>, activities: Activities) -> Self {
        Self {
            processor,
            activities,
        }
    }

    /// Generate and attach. Equivalent to [`generate_all`](Self::generate_all)
    /// followed by [`persist`](Self::persist).
    pub async fn run(&self, request: ImageryRequest) -> Option<SatelliteImagery> {
        let imagery = self.generate_all(&request).await?;
        self.persist(imagery, request.coordinates).await
    }

    /// Generate the three products concurrently without touching the site.
    ///
    /// `None` when the coordinates are unusable; otherwise every product that
    /// failed is simply missing from the result.
    pub async fn generate_all(&self, request: &ImageryRequest) -> Option<SatelliteImagery> {
        if !request.coordinates.is_valid() {
            warn!(
                "Skipping satellite imagery for site {}: invalid coordinates (0,0)",
                request.site_id
            );
            return None;
        }

        info!(
            "Generating satellite imagery for site {} via {}",
            request.site_id,
            self.processor.name()
        );

        let (ndvi, true_color, false_color) = futures::future::join3(
            self.generate(ImageryKind::Ndvi, request),
            self.generate(ImageryKind::TrueColor, request),
            self.generate(ImageryKind::FalseColor, request),
        )
        .await;

        Some(SatelliteImagery {
            site_id: request.site_id.clone(),
            ndvi_url: ndvi,
            true_color_url: true_color,
            false_color_url: false_color,
            processed_at: Utc::now(),
        })
    }

    /// Attach generated images to the site, which must already exist.
    pub async fn persist(
        &self,
        imagery: SatelliteImagery,
        coordinates: Coordinates,
    ) -> Option<SatelliteImagery> {
        if let Err(e) = self
            .activities
            .update_site_with_imagery(&imagery, coordinates)
            .await
        {
            warn!(
                "Failed to attach satellite imagery to site {}: {}",
                imagery.site_id, e
            );
            return None;
        }

        info!(
            "Satellite imagery for site {}: {}/{} generated",
            imagery.site_id,
            imagery.generated_count(),
            ImageryKind::ALL.len()
        );
        Some(imagery)
    }

    async fn generate(&self, kind: ImageryKind, request: &ImageryRequest) -> Option<String> {
        let timer = metrics::EXTERNAL_SERVICE_DURATION
            .with_label_values(&["imagery", kind.as_str()])
            .start_timer();
        let result = self.processor.generate(kind, request).await;
        timer.observe_duration();

        match result {
            Ok(image) => {
                metrics::IMAGERY_RESULTS_TOTAL
                    .with_label_values(&[kind.as_str(), "success"])
                    .inc();
                Some(image.image_url)
            }
            Err(e) => {
                metrics::IMAGERY_RESULTS_TOTAL
                    .with_label_values(&[kind.as_str(), "failed"])
                    .inc();
                warn!(
                    "{} generation failed for site {}: {}",
                    kind.component_name(),
                    request.site_id,
                    e
                );
                None
            }
        }
    }
}
