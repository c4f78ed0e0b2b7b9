//! Image analysis, panel deliberation and outcome persistence for one site.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use super::analyzer::{ImageGroupAnalyzer, SiteContext};
use super::types::{
    AnalysisError, AnalysisResult, ImageInput, ImageKind, ERROR_GROUP, SPECTRAL_GROUP,
    TOPOGRAPHY_GROUP,
};
use crate::activities::{is_published_locator, Activities};
use crate::config::ScoringConfig;
use crate::deliberation::{
    build_initial_context, AgentMessage, Author, Deliberation, Panelist, Transcript, Verdict,
    DEFAULT_MAX_ROUNDS,
};
use crate::event_bus::ProcessingResult;
use crate::imagery::SatelliteImagery;
use crate::metrics;
use crate::site::{Coordinates, SiteStatus};

/// Topography images kept for the reduced retry.
const REDUCED_TOPOGRAPHY: [ImageKind; 2] = [ImageKind::Dtm, ImageKind::Hillshade];

/// Everything the analysis needs about one site.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub site_id: String,
    pub coordinates: Coordinates,
    pub user_id: Option<String>,
    pub historical_context: Option<String>,
    pub system_prompt: Option<String>,
    pub topography: Vec<ImageInput>,
    pub spectral: Vec<ImageInput>,
}

impl AnalysisRequest {
    pub fn new(site_id: impl Into<String>, coordinates: Coordinates) -> Self {
        Self {
            site_id: site_id.into(),
            coordinates,
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    /// Add an image if its locator is published; routed by modality.
    pub fn with_image(mut self, kind: ImageKind, url: Option<&str>) -> Self {
        if let Some(url) = url.map(str::trim).filter(|u| is_published_locator(u)) {
            let image = ImageInput::new(kind, url);
            if kind.is_spectral() {
                self.spectral.push(image);
            } else {
                self.topography.push(image);
            }
        }
        self
    }

    /// Raster outputs, historical context and prompt override from the
    /// processors' completion event.
    pub fn with_raster_results(mut self, result: &ProcessingResult) -> Self {
        self.historical_context = result.historical_context.clone();
        if result.system_prompt.is_some() {
            self.system_prompt = result.system_prompt.clone();
        }
        self.with_image(ImageKind::Hillshade, result.hillshade_image.as_deref())
            .with_image(
                ImageKind::HillshadeMultiDirectional,
                result.hillshade_multi_directional_image.as_deref(),
            )
            .with_image(ImageKind::Slope, result.slope_image.as_deref())
            .with_image(ImageKind::Dtm, result.dtm_image.as_deref())
            .with_image(ImageKind::Dsm, result.dsm_image.as_deref())
    }

    pub fn with_imagery(self, imagery: Option<&SatelliteImagery>) -> Self {
        match imagery {
            Some(imagery) => self
                .with_image(ImageKind::Ndvi, imagery.ndvi_url.as_deref())
                .with_image(ImageKind::TrueColor, imagery.true_color_url.as_deref())
                .with_image(ImageKind::FalseColor, imagery.false_color_url.as_deref()),
            None => self,
        }
    }

    fn site_context(&self) -> SiteContext<'_> {
        SiteContext {
            site_id: &self.site_id,
            coordinates: self.coordinates,
            historical_context: self.historical_context.as_deref(),
            system_prompt: self.system_prompt.as_deref(),
        }
    }
}

/// Summary of a finished analysis, for status reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub site_id: String,
    pub groups: Vec<String>,
    pub mean_confidence: f64,
    pub verdict: Verdict,
    /// Panel messages in the stored transcript.
    pub turns: usize,
    /// Set when the sub-orchestration stopped early.
    pub error: Option<String>,
}

impl AnalysisOutcome {
    fn new(site_id: &str) -> Self {
        Self {
            site_id: site_id.to_string(),
            groups: Vec::new(),
            mean_confidence: 0.0,
            verdict: Verdict::Undetermined,
            turns: 0,
            error: None,
        }
    }
}

/// Mean confidence over every feature of every non-error result; 0 when
/// nothing was detected.
pub fn mean_confidence(results: &BTreeMap<String, AnalysisResult>) -> f64 {
    let confidences: Vec<f64> = results
        .values()
        .filter(|r| !r.is_error)
        .flat_map(|r| r.features.iter().map(|f| f.confidence))
        .collect();

    if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    }
}

/// Child orchestration run after the raster results are persisted.
///
/// Never fails the parent: everything is caught at [`run`](Self::run).
pub struct AnalysisSubOrchestrator {
    analyzer: ImageGroupAnalyzer,
    panel: Arc<dyn Panelist>,
    activities: Activities,
    max_rounds: u32,
    scoring: ScoringConfig,
}

impl AnalysisSubOrchestrator {
    pub fn new(
        analyzer: ImageGroupAnalyzer,
        panel: Arc<dyn Panelist>,
        activities: Activities,
    ) -> Self {
        Self {
            analyzer,
            panel,
            activities,
            max_rounds: DEFAULT_MAX_ROUNDS,
            scoring: ScoringConfig::default(),
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub async fn run(&self, request: AnalysisRequest) -> AnalysisOutcome {
        let mut outcome = AnalysisOutcome::new(&request.site_id);
        if let Err(e) = self.execute(&request, &mut outcome).await {
            error!("Analysis for site {} failed: {}", request.site_id, e);
            outcome.error = Some(e.to_string());
        }
        outcome
    }

    async fn execute(
        &self,
        request: &AnalysisRequest,
        outcome: &mut AnalysisOutcome,
    ) -> Result<(), AnalysisError> {
        let site_id = request.site_id.as_str();
        info!(
            "Starting analysis for site {} ({} topography, {} spectral images)",
            site_id,
            request.topography.len(),
            request.spectral.len()
        );

        let results = self.analyze_images(request).await;
        outcome.groups = results.keys().cloned().collect();
        outcome.mean_confidence = mean_confidence(&results);

        let report = self
            .activities
            .store_analysis_relationships(site_id, &results)
            .await;
        metrics::RELATIONSHIP_WRITE_FAILURES.inc_by(report.failures as u64);

        let user_id = request.user_id.as_deref();
        match user_id {
            Some(user_id) => {
                self.activities
                    .add_discovery(
                        user_id,
                        site_id,
                        self.scoring.discovery_points,
                        outcome.mean_confidence * 100.0,
                    )
                    .await?;
            }
            None => warn!("No user for site {}, skipping scoring", site_id),
        }

        // Spectral results are stored but kept out of the panel context.
        let topography = results
            .get(TOPOGRAPHY_GROUP)
            .filter(|r| !r.is_error);
        let context = build_initial_context(
            site_id,
            request.coordinates,
            request.historical_context.as_deref(),
            topography,
        );

        let (transcript, verdict) = match Deliberation::new(self.panel.clone(), self.max_rounds)
            .run(site_id, context)
            .await
        {
            Ok(deliberation) => (deliberation.transcript, deliberation.verdict),
            Err(e) => {
                error!("Deliberation for site {} failed: {}", site_id, e);
                let mut transcript = Transcript::new();
                transcript.push(AgentMessage::new(
                    Author::System,
                    format!("Error during team analysis: {}", e),
                ));
                (transcript, Verdict::Undetermined)
            }
        };
        outcome.verdict = verdict;
        outcome.turns = transcript.panel_turns();

        // Persisted whatever happens to the verdict writes below.
        self.activities
            .store_transcript(site_id, user_id, &transcript)
            .await?;

        match verdict {
            Verdict::Approved => {
                self.activities.update_approval_status(site_id, true).await?;
                if let Some(user_id) = user_id {
                    self.activities
                        .award_points(
                            user_id,
                            &format!("approval:{}", site_id),
                            self.scoring.approval_bonus,
                        )
                        .await?;
                }
            }
            Verdict::Rejected => {
                self.activities
                    .update_approval_status(site_id, false)
                    .await?;
            }
            Verdict::Undetermined => {
                info!("No verdict for site {}, approval status unchanged", site_id);
            }
        }

        self.activities
            .update_site_status(site_id, SiteStatus::Analyzed)
            .await?;

        info!(
            "Analysis for site {} finished: {} (mean confidence {:.2})",
            site_id, verdict, outcome.mean_confidence
        );
        Ok(())
    }

    /// Group results keyed by group name. A failure that escapes the group
    /// analyses is recorded under [`ERROR_GROUP`].
    async fn analyze_images(&self, request: &AnalysisRequest) -> BTreeMap<String, AnalysisResult> {
        let mut results = BTreeMap::new();
        if let Err(e) = self.analyze_groups(request, &mut results).await {
            error!(
                "Error during image analysis for site {}: {}",
                request.site_id, e
            );
            results.insert(
                ERROR_GROUP.to_string(),
                AnalysisResult::error(ERROR_GROUP, &e.to_string()),
            );
        }
        results
    }

    async fn analyze_groups(
        &self,
        request: &AnalysisRequest,
        results: &mut BTreeMap<String, AnalysisResult>,
    ) -> Result<(), AnalysisError> {
        let site = request.site_context();

        if !request.topography.is_empty() {
            let result = self.analyze_topography(&site, &request.topography).await?;
            results.insert(TOPOGRAPHY_GROUP.to_string(), result);
        }

        if !request.spectral.is_empty() {
            let result = self
                .analyzer
                .analyze(&site, SPECTRAL_GROUP, &request.spectral)
                .await?;
            results.insert(SPECTRAL_GROUP.to_string(), result);
        }
        Ok(())
    }

    /// One retry restricted to DTM and hillshade. With neither available the
    /// failure is stored as a placeholder.
    async fn analyze_topography(
        &self,
        site: &SiteContext<'_>,
        images: &[ImageInput],
    ) -> Result<AnalysisResult, AnalysisError> {
        let err = match self.analyzer.analyze(site, TOPOGRAPHY_GROUP, images).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };
        warn!(
            "{} analysis failed for site {}: {}",
            TOPOGRAPHY_GROUP, site.site_id, err
        );

        let reduced: Vec<ImageInput> = images
            .iter()
            .filter(|i| REDUCED_TOPOGRAPHY.contains(&i.kind))
            .cloned()
            .collect();

        if reduced.is_empty() {
            warn!(
                "No suitable images left for {} analysis for site {}",
                TOPOGRAPHY_GROUP, site.site_id
            );
            return Ok(AnalysisResult::error(TOPOGRAPHY_GROUP, &err.to_string()));
        }

        info!(
            "Retrying {} analysis with {} reduced images for site {}",
            TOPOGRAPHY_GROUP,
            reduced.len(),
            site.site_id
        );
        metrics::TOPOGRAPHY_RETRIES_TOTAL.inc();
        self.analyzer.analyze(site, TOPOGRAPHY_GROUP, &reduced).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::transcript_session_id;
    use crate::analysis::DetectedFeature;
    use crate::completion::LlmError;
    use crate::deliberation::PanelRole;
    use crate::site::{
        Leaderboard, MemorySiteStore, SiteRecord, SiteRepository, TranscriptStore,
    };
    use crate::testing::{MockCompletionClient, ScriptedPanel};

    const SITE: &str = "mound_survey_20240309140507";
    const TOPO_JSON: &str = r#"{"caption":"Circular enclosure","tags":["enclosure"],"features":[{"name":"Ring ditch","confidence":0.8,"description":"30m ring"},{"name":"Bank","confidence":0.6,"description":"low bank"}]}"#;

    struct Fixture {
        store: Arc<MemorySiteStore>,
        client: Arc<MockCompletionClient>,
        sub: AnalysisSubOrchestrator,
    }

    async fn fixture(panel: ScriptedPanel) -> Fixture {
        let store = Arc::new(MemorySiteStore::new());
        store
            .upsert_site(&SiteRecord::processing(SITE, Coordinates::new(12.5, 77.2), None))
            .await
            .unwrap();
        let client = Arc::new(MockCompletionClient::new());
        let sub = AnalysisSubOrchestrator::new(
            ImageGroupAnalyzer::new(client.clone()),
            Arc::new(panel),
            Activities::from_store(store.clone()),
        );
        Fixture { store, client, sub }
    }

    fn approving_panel() -> ScriptedPanel {
        ScriptedPanel::new()
            .with_replies(
                PanelRole::Coordinator,
                &["Let us review.", "Approved: clear ring ditch with bank"],
            )
            .with_default("The ring ditch looks man-made.")
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(SITE, Coordinates::new(12.5, 77.2))
            .with_user(Some("u1".to_string()))
            .with_image(ImageKind::Hillshade, Some("https://blobs/hs.png"))
            .with_image(ImageKind::Slope, Some("https://blobs/slope.png"))
            .with_image(ImageKind::Dtm, Some("https://blobs/dtm.png"))
    }

    #[test]
    fn test_request_routes_and_filters_images() {
        let result = ProcessingResult {
            hillshade_image: Some("https://blobs/hs.png".to_string()),
            slope_image: Some("/local/slope.png".to_string()),
            dsm_image: Some(String::new()),
            historical_context: Some("Roman road".to_string()),
            ..Default::default()
        };
        let imagery = SatelliteImagery {
            site_id: SITE.to_string(),
            ndvi_url: Some("https://img/ndvi.png".to_string()),
            true_color_url: None,
            false_color_url: None,
            processed_at: chrono::Utc::now(),
        };

        let request = AnalysisRequest::new(SITE, Coordinates::new(1.0, 2.0))
            .with_raster_results(&result)
            .with_imagery(Some(&imagery));

        assert_eq!(request.topography.len(), 1);
        assert_eq!(request.topography[0].kind, ImageKind::Hillshade);
        assert_eq!(request.spectral.len(), 1);
        assert_eq!(request.spectral[0].kind, ImageKind::Ndvi);
        assert_eq!(request.historical_context.as_deref(), Some("Roman road"));
    }

    #[test]
    fn test_mean_confidence_skips_errors() {
        let mut results = BTreeMap::new();
        assert_eq!(mean_confidence(&results), 0.0);

        results.insert(
            TOPOGRAPHY_GROUP.to_string(),
            AnalysisResult {
                group_name: TOPOGRAPHY_GROUP.to_string(),
                caption: String::new(),
                tags: vec![],
                features: vec![
                    DetectedFeature {
                        name: "a".into(),
                        confidence: 0.5,
                        description: String::new(),
                    },
                    DetectedFeature {
                        name: "b".into(),
                        confidence: 1.0,
                        description: String::new(),
                    },
                ],
                image_urls: vec![],
                is_error: false,
            },
        );
        results.insert(
            ERROR_GROUP.to_string(),
            AnalysisResult::error(ERROR_GROUP, "boom"),
        );
        assert_eq!(mean_confidence(&results), 0.75);
    }

    #[tokio::test]
    async fn test_approved_site_flagged_and_scored() {
        let f = fixture(approving_panel()).await;
        f.client.push_text(TOPO_JSON).await;

        let outcome = f.sub.run(request()).await;

        assert_eq!(outcome.verdict, Verdict::Approved);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.groups, vec![TOPOGRAPHY_GROUP.to_string()]);
        assert!((outcome.mean_confidence - 0.7).abs() < 1e-9);

        let site = f.store.get_site(SITE).await.unwrap().unwrap();
        assert!(site.is_possible_archaeological_site);
        assert_eq!(site.status, SiteStatus::Analyzed);
        assert_eq!(f.store.total_points("u1").await.unwrap(), 110);

        let transcript = f
            .store
            .get_transcript(&transcript_session_id(SITE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transcript.len(), outcome.turns + 1);
        assert!(transcript.messages()[0].message.contains("Ring ditch"));
    }

    #[tokio::test]
    async fn test_topography_retry_with_reduced_images() {
        let f = fixture(approving_panel()).await;
        f.client
            .push_error(LlmError::Api {
                status: 400,
                message: "image too large".to_string(),
            })
            .await;
        f.client.push_text(TOPO_JSON).await;

        let outcome = f.sub.run(request()).await;

        let requests = f.client.recorded_requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].image_urls.len(), 3);
        assert_eq!(
            requests[1].image_urls,
            vec!["https://blobs/hs.png", "https://blobs/dtm.png"]
        );

        assert_eq!(outcome.groups, vec![TOPOGRAPHY_GROUP.to_string()]);
        let analysis = f
            .store
            .node(
                crate::activities::ANALYSIS_LABEL,
                &format!("{}_{}", SITE, TOPOGRAPHY_GROUP),
            )
            .await
            .unwrap();
        assert_eq!(analysis.properties["caption"], "Circular enclosure");
    }

    #[tokio::test]
    async fn test_no_reduced_images_stores_placeholder() {
        let f = fixture(ScriptedPanel::new().with_default("Rejected: nothing to see")).await;
        f.client.push_error(LlmError::Http("reset".to_string())).await;

        let request = AnalysisRequest::new(SITE, Coordinates::new(12.5, 77.2))
            .with_image(ImageKind::Slope, Some("https://blobs/slope.png"));
        let outcome = f.sub.run(request).await;

        assert_eq!(f.client.recorded_requests().await.len(), 1);
        assert_eq!(outcome.groups, vec![TOPOGRAPHY_GROUP.to_string()]);
        assert_eq!(outcome.mean_confidence, 0.0);
        // Placeholders are not written to the graph.
        assert_eq!(f.store.node_count(crate::activities::ANALYSIS_LABEL).await, 0);
    }

    #[tokio::test]
    async fn test_spectral_failure_recorded_as_error_group() {
        let f = fixture(approving_panel()).await;
        f.client.push_text(TOPO_JSON).await;
        f.client.push_text("not json at all").await;

        let request = request().with_image(ImageKind::TrueColor, Some("https://img/tc.png"));
        let outcome = f.sub.run(request).await;

        assert_eq!(
            outcome.groups,
            vec![ERROR_GROUP.to_string(), TOPOGRAPHY_GROUP.to_string()]
        );
        // Topography is still deliberated.
        assert_eq!(outcome.verdict, Verdict::Approved);
    }

    #[tokio::test]
    async fn test_deliberation_failure_persists_system_transcript() {
        let panel = ScriptedPanel::new()
            .with_default("ok")
            .failing_on(PanelRole::Coordinator);
        let f = fixture(panel).await;
        f.client.push_text(TOPO_JSON).await;

        let outcome = f.sub.run(request()).await;

        assert_eq!(outcome.verdict, Verdict::Undetermined);
        assert!(outcome.error.is_none());

        let transcript = f
            .store
            .get_transcript(&transcript_session_id(SITE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.messages()[0].author, Author::System);

        let site = f.store.get_site(SITE).await.unwrap().unwrap();
        assert!(!site.is_possible_archaeological_site);
        assert_eq!(site.status, SiteStatus::Analyzed);
        // Discovery is recorded before deliberation.
        assert_eq!(f.store.total_points("u1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_rejected_without_user_skips_scoring() {
        let panel = ScriptedPanel::new()
            .with_replies(
                PanelRole::Coordinator,
                &["Open.", "Rejected: natural erosion channels"],
            )
            .with_default("Looks natural.");
        let f = fixture(panel).await;
        f.client.push_text(TOPO_JSON).await;

        let outcome = f.sub.run(request().with_user(None)).await;

        assert_eq!(outcome.verdict, Verdict::Rejected);
        assert!(f.store.discoveries("u1").await.is_empty());
        let site = f.store.get_site(SITE).await.unwrap().unwrap();
        assert!(!site.is_possible_archaeological_site);
    }

    #[tokio::test]
    async fn test_missing_site_is_caught() {
        let store = Arc::new(MemorySiteStore::new());
        let client = Arc::new(MockCompletionClient::new());
        client.push_text(TOPO_JSON).await;
        let sub = AnalysisSubOrchestrator::new(
            ImageGroupAnalyzer::new(client),
            Arc::new(approving_panel()),
            Activities::from_store(store),
        );

        let outcome = sub.run(request()).await;
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_transcript_kept_when_approval_write_fails() {
        // No site record, so the approval flag write fails.
        let store = Arc::new(MemorySiteStore::new());
        let client = Arc::new(MockCompletionClient::new());
        client.push_text(TOPO_JSON).await;
        let sub = AnalysisSubOrchestrator::new(
            ImageGroupAnalyzer::new(client),
            Arc::new(approving_panel()),
            Activities::from_store(store.clone()),
        );

        let outcome = sub.run(request()).await;

        assert_eq!(outcome.verdict, Verdict::Approved);
        assert!(outcome.error.unwrap().contains("site not found"));
        let transcript = store
            .get_transcript(&transcript_session_id(SITE))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transcript.len(), outcome.turns + 1);
        // The bonus is only awarded after the flag is set.
        assert_eq!(store.total_points("u1").await.unwrap(), 10);
    }
}
