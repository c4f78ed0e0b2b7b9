//! One method per activity. Every write is keyed by a stable id so an
//! activity can run again with the same input and leave the same state.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use super::error::ActivityError;
use crate::analysis::{AnalysisResult, ERROR_GROUP};
use crate::deliberation::Transcript;
use crate::event_bus::ProcessingResult;
use crate::imagery::{ImageryKind, SatelliteImagery};
use crate::site::{
    Coordinates, Discovery, GraphNode, GraphRelationship, GraphStore, Leaderboard, PointsAward,
    SiteComponent, SiteRecord, SiteRepository, SiteStatus, TranscriptStore, UserRef, SITE_LABEL,
};

pub const ANALYSIS_LABEL: &str = "AnalysisResult";
pub const FEATURE_LABEL: &str = "ArchaeologicalFeature";

/// Raster products and the component names they are attached as.
const RASTER_COMPONENTS: [&str; 5] = [
    "Digital Terrain Model",
    "Digital Surface Model",
    "Hillshade Multi-Directional",
    "Hillshade",
    "Slope Analysis",
];

/// A locator is recorded only if it points at a published HTTPS resource.
pub fn is_published_locator(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && url.starts_with("https://")
}

/// Session id transcripts are stored under.
pub fn transcript_session_id(site_id: &str) -> String {
    format!("site-analysis-{}", site_id)
}

/// Outcome of a best-effort relationship batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipReport {
    pub groups: usize,
    pub writes: usize,
    pub failures: usize,
}

/// Wraps the persistence collaborators.
#[derive(Clone)]
pub struct Activities {
    sites: Arc<dyn SiteRepository>,
    graph: Arc<dyn GraphStore>,
    transcripts: Arc<dyn TranscriptStore>,
    leaderboard: Arc<dyn Leaderboard>,
}

impl Activities {
    pub fn new(
        sites: Arc<dyn SiteRepository>,
        graph: Arc<dyn GraphStore>,
        transcripts: Arc<dyn TranscriptStore>,
        leaderboard: Arc<dyn Leaderboard>,
    ) -> Self {
        Self {
            sites,
            graph,
            transcripts,
            leaderboard,
        }
    }

    /// All collaborators served by one store.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: SiteRepository + GraphStore + TranscriptStore + Leaderboard + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store)
    }

    /// Create (or refresh) the site record in the `Processing` state.
    pub async fn instantiate_site_node(
        &self,
        site_id: &str,
        coordinates: Coordinates,
        owner: Option<UserRef>,
    ) -> Result<SiteRecord, ActivityError> {
        let site = SiteRecord::processing(site_id, coordinates, owner);
        self.sites.upsert_site(&site).await?;
        info!(
            "Created site node {} at {}, {}",
            site_id, coordinates.latitude, coordinates.longitude
        );
        Ok(site)
    }

    /// Attach every published raster output. Returns how many were attached.
    pub async fn persist_raster_results(
        &self,
        site_id: &str,
        result: &ProcessingResult,
        coordinates: Coordinates,
    ) -> Result<usize, ActivityError> {
        let locators = [
            &result.dtm_image,
            &result.dsm_image,
            &result.hillshade_multi_directional_image,
            &result.hillshade_image,
            &result.slope_image,
        ];

        let components: Vec<SiteComponent> = RASTER_COMPONENTS
            .iter()
            .zip(locators)
            .filter_map(|(name, url)| {
                url.as_deref()
                    .filter(|u| is_published_locator(u))
                    .map(|u| SiteComponent::available(site_id, *name, coordinates, u.trim()))
            })
            .collect();

        if components.is_empty() {
            warn!("No published raster outputs for site {}", site_id);
            return Ok(0);
        }

        self.sites.attach_components(site_id, &components).await?;
        info!(
            "Attached {} raster components to site {}",
            components.len(),
            site_id
        );
        Ok(components.len())
    }

    /// Attach the generated satellite images. Returns how many were attached.
    pub async fn update_site_with_imagery(
        &self,
        imagery: &SatelliteImagery,
        coordinates: Coordinates,
    ) -> Result<usize, ActivityError> {
        let components: Vec<SiteComponent> = ImageryKind::ALL
            .iter()
            .filter_map(|kind| {
                imagery.url(*kind).map(|url| {
                    SiteComponent::available(
                        &imagery.site_id,
                        kind.component_name(),
                        coordinates,
                        url,
                    )
                })
            })
            .collect();

        if components.is_empty() {
            debug!("No satellite imagery to attach for site {}", imagery.site_id);
            return Ok(0);
        }

        self.sites
            .attach_components(&imagery.site_id, &components)
            .await?;
        info!(
            "Attached {} satellite images to site {}",
            components.len(),
            imagery.site_id
        );
        Ok(components.len())
    }

    /// Write analysis nodes, feature nodes and their relationships.
    ///
    /// Best effort: a failed write is logged and counted and the batch
    /// carries on.
    pub async fn store_analysis_relationships(
        &self,
        site_id: &str,
        results: &BTreeMap<String, AnalysisResult>,
    ) -> RelationshipReport {
        let mut report = RelationshipReport::default();

        for (group, result) in results {
            if group == ERROR_GROUP || result.is_error || result.features.is_empty() {
                continue;
            }
            report.groups += 1;

            let analysis_id = format!("{}_{}", site_id, group);
            let analysis_node = GraphNode {
                label: ANALYSIS_LABEL.to_string(),
                key: analysis_id.clone(),
                properties: json!({
                    "id": analysis_id,
                    "siteId": site_id,
                    "groupName": group,
                    "caption": result.caption,
                    "tags": result.tags.join(","),
                }),
            };
            if let Err(e) = self.graph.upsert_node(&analysis_node).await {
                warn!("Failed to store analysis node {}: {}", analysis_id, e);
                report.failures += 1;
                continue;
            }
            report.writes += 1;

            self.link(&mut report, SITE_LABEL, site_id, "HAS_ANALYSIS", ANALYSIS_LABEL, &analysis_id)
                .await;

            for (index, feature) in result.features.iter().enumerate() {
                let feature_id = format!("{}_{}", analysis_id, index);
                let feature_node = GraphNode {
                    label: FEATURE_LABEL.to_string(),
                    key: feature_id.clone(),
                    properties: json!({
                        "id": feature_id,
                        "analysisId": analysis_id,
                        "name": feature.name,
                        "confidence": feature.confidence,
                        "description": feature.description,
                    }),
                };
                if let Err(e) = self.graph.upsert_node(&feature_node).await {
                    warn!("Failed to store feature node {}: {}", feature_id, e);
                    report.failures += 1;
                    continue;
                }
                report.writes += 1;

                self.link(
                    &mut report,
                    ANALYSIS_LABEL,
                    &analysis_id,
                    "DETECTED_FEATURE",
                    FEATURE_LABEL,
                    &feature_id,
                )
                .await;
                self.link(&mut report, SITE_LABEL, site_id, "HAS_FEATURE", FEATURE_LABEL, &feature_id)
                    .await;
            }
        }

        if report.failures > 0 {
            warn!(
                "Stored analysis relationships for site {} with {} failed writes",
                site_id, report.failures
            );
        } else {
            info!(
                "Stored analysis relationships for site {} ({} groups)",
                site_id, report.groups
            );
        }
        report
    }

    async fn link(
        &self,
        report: &mut RelationshipReport,
        from_label: &str,
        from_key: &str,
        kind: &str,
        to_label: &str,
        to_key: &str,
    ) {
        let relationship = GraphRelationship {
            from_label: from_label.to_string(),
            from_key: from_key.to_string(),
            kind: kind.to_string(),
            to_label: to_label.to_string(),
            to_key: to_key.to_string(),
        };
        match self.graph.upsert_relationship(&relationship).await {
            Ok(()) => report.writes += 1,
            Err(e) => {
                warn!(
                    "Failed to create {} from {} to {}: {}",
                    kind, from_key, to_key, e
                );
                report.failures += 1;
            }
        }
    }

    /// Replace the site's stored transcript.
    pub async fn store_transcript(
        &self,
        site_id: &str,
        user_id: Option<&str>,
        transcript: &Transcript,
    ) -> Result<(), ActivityError> {
        let session_id = transcript_session_id(site_id);
        self.transcripts
            .save_transcript(&session_id, site_id, user_id, transcript)
            .await?;
        info!(
            "Stored transcript {} with {} messages",
            session_id,
            transcript.len()
        );
        Ok(())
    }

    pub async fn update_approval_status(
        &self,
        site_id: &str,
        approved: bool,
    ) -> Result<(), ActivityError> {
        self.sites.set_approval_status(site_id, approved).await?;
        info!("Site {} approval status set to {}", site_id, approved);
        Ok(())
    }

    pub async fn update_site_status(
        &self,
        site_id: &str,
        status: SiteStatus,
    ) -> Result<(), ActivityError> {
        self.sites.set_status(site_id, status).await?;
        debug!("Site {} status set to {}", site_id, status);
        Ok(())
    }

    /// Record the verdict-independent discovery entry.
    pub async fn add_discovery(
        &self,
        user_id: &str,
        site_id: &str,
        points: u32,
        accuracy: f64,
    ) -> Result<(), ActivityError> {
        let discovery = Discovery {
            site_id: site_id.to_string(),
            points_awarded: points,
            accuracy,
        };
        self.leaderboard.add_discovery(user_id, &discovery).await?;
        info!(
            "Recorded discovery of {} for user {} ({} points, accuracy {:.1})",
            site_id, user_id, points, accuracy
        );
        Ok(())
    }

    pub async fn award_points(
        &self,
        user_id: &str,
        key: &str,
        points: u32,
    ) -> Result<(), ActivityError> {
        let award = PointsAward {
            key: key.to_string(),
            points,
        };
        self.leaderboard.award_points(user_id, &award).await?;
        info!("Awarded {} points to user {} ({})", points, user_id, key);
        Ok(())
    }
}
