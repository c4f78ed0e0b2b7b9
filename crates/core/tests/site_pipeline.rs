//! Site pipeline integration tests.
//!
//! These tests drive uploads through the orchestrator host with in-memory
//! collaborators: submit -> dispatch -> completion event -> fan-out ->
//! raster persistence -> analysis and deliberation.

use std::sync::Arc;

use stratum_core::{
    activities::{transcript_session_id, Activities},
    analysis::{AnalysisSubOrchestrator, ImageGroupAnalyzer},
    audit::{AuditFilter, AuditStore},
    create_audit_system,
    deliberation::{Author, Verdict},
    imagery::ImagerySubOrchestrator,
    site::{Leaderboard, MemorySiteStore, SiteRepository, SiteStatus, TranscriptStore},
    testing::{fixtures, MockCompletionClient, MockImageryProcessor, MockWorkQueue, ScriptedPanel},
    CorrelationEventBus, InstanceState, JobStage, MemoryAuditStore, OrchestratorConfig,
    SiteOrchestrator, SiteProcessingWorkflow,
};
use tokio::task::JoinHandle;

/// Test helper wiring every collaborator in memory.
struct TestHarness {
    store: Arc<MemorySiteStore>,
    queue: Arc<MockWorkQueue>,
    client: Arc<MockCompletionClient>,
    processor: Arc<MockImageryProcessor>,
    audit_store: Arc<MemoryAuditStore>,
    audit_writer: JoinHandle<()>,
    orchestrator: SiteOrchestrator,
}

impl TestHarness {
    fn new(panel: ScriptedPanel) -> Self {
        let store = Arc::new(MemorySiteStore::new());
        let queue = Arc::new(MockWorkQueue::new());
        let client = Arc::new(MockCompletionClient::new());
        let processor = Arc::new(MockImageryProcessor::new());
        let audit_store = Arc::new(MemoryAuditStore::default());

        let (audit, writer) = create_audit_system(audit_store.clone(), 100);
        let audit_writer = tokio::spawn(writer.run());

        let activities = Activities::from_store(store.clone());
        let bus = Arc::new(CorrelationEventBus::new(
            queue.clone(),
            "https://blobs.test/uploads",
        ));
        let imagery = Arc::new(ImagerySubOrchestrator::new(
            processor.clone(),
            activities.clone(),
        ));
        let analysis = Arc::new(AnalysisSubOrchestrator::new(
            ImageGroupAnalyzer::new(client.clone()),
            Arc::new(panel),
            activities.clone(),
        ));
        let workflow =
            SiteProcessingWorkflow::new(bus, activities, analysis).with_imagery(imagery);
        let orchestrator =
            SiteOrchestrator::new(OrchestratorConfig::default(), workflow, Some(audit));

        Self {
            store,
            queue,
            client,
            processor,
            audit_store,
            audit_writer,
            orchestrator,
        }
    }

    /// Wait until the instance has registered its completion event.
    async fn wait_until_waiting(&self, instance_id: &str) {
        loop {
            let record = self
                .orchestrator
                .instance(instance_id)
                .await
                .expect("instance exists");
            assert!(!record.state.is_terminal(), "ended early: {:?}", record);
            if record.stage == JobStage::AwaitExternal {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Drop the orchestrator and wait for every audit event to be stored.
    async fn audit_types(self, instance_id: &str) -> Vec<String> {
        drop(self.orchestrator);
        self.audit_writer.await.expect("audit writer");
        let mut records = self
            .audit_store
            .query(&AuditFilter::new().with_instance_id(instance_id))
            .expect("query audit");
        records.reverse();
        records.into_iter().map(|r| r.event_type).collect()
    }
}

#[tokio::test]
async fn test_approved_upload_end_to_end() {
    let h = TestHarness::new(fixtures::approving_panel());
    h.client.push_text(fixtures::TOPOGRAPHY_RESPONSE).await;
    h.client.push_text(fixtures::SPECTRAL_RESPONSE).await;

    let id = h
        .orchestrator
        .submit(fixtures::upload("mound_survey.las"))
        .await
        .unwrap();
    h.wait_until_waiting(&id).await;

    let published = h.queue.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].event_name, "LiDARProcessingCompleted");
    assert_eq!(
        published[0].blob_uri,
        "https://blobs.test/uploads/mound_survey.las"
    );
    let site_id = published[0].site_id.clone();
    let stamp = site_id.strip_prefix("mound_survey_").unwrap();
    assert_eq!(stamp.len(), 14);
    assert!(stamp.chars().all(|c| c.is_ascii_digit()));

    h.orchestrator
        .raise_event(&id, "LiDARProcessingCompleted", fixtures::success_result(12.5, 77.2))
        .await
        .unwrap();
    let record = h.orchestrator.run_to_completion(&id).await.unwrap();

    assert_eq!(record.state, InstanceState::Completed);
    assert_eq!(record.stage, JobStage::Done);
    assert_eq!(record.site_id.as_deref(), Some(site_id.as_str()));
    let analysis = record.analysis.unwrap();
    assert_eq!(analysis.verdict, Verdict::Approved);
    assert_eq!(analysis.groups, vec!["SpectralGroup", "TopographyGroup"]);

    // Imagery ran because the coordinates were non-zero.
    assert_eq!(h.processor.calls().await.len(), 3);

    let site = h.store.get_site(&site_id).await.unwrap().unwrap();
    assert_eq!(site.coordinates.latitude, 12.5);
    assert_eq!(site.coordinates.longitude, 77.2);
    assert_eq!(site.status, SiteStatus::Analyzed);
    assert!(site.is_possible_archaeological_site);
    for component in [
        "DTM",
        "Hillshade",
        "Slope Analysis",
        "NDVI",
        "True Color Satellite",
        "False Color Satellite",
    ] {
        assert!(site.component(component).is_some(), "missing {}", component);
    }

    // Discovery (10) plus approval bonus (100).
    assert_eq!(h.store.total_points("u1").await.unwrap(), 110);

    let transcript = h
        .store
        .get_transcript(&transcript_session_id(&site_id))
        .await
        .unwrap()
        .unwrap();
    let last = transcript.messages().last().unwrap();
    assert!(matches!(last.author, Author::Panel(_)));
    assert!(last.message.starts_with("Approved:"));

    let types = h.audit_types(&id).await;
    assert_eq!(types.first().map(String::as_str), Some("job_submitted"));
    assert_eq!(types.last().map(String::as_str), Some("job_completed"));
    for expected in [
        "job_dispatched",
        "external_event_received",
        "imagery_completed",
        "analysis_completed",
    ] {
        assert!(types.iter().any(|t| t == expected), "missing {}", expected);
    }
}

#[tokio::test]
async fn test_rejected_upload_keeps_flag_clear() {
    let h = TestHarness::new(fixtures::rejecting_panel());
    h.client.push_text(fixtures::TOPOGRAPHY_RESPONSE).await;
    h.client.push_text(fixtures::SPECTRAL_RESPONSE).await;

    let id = h
        .orchestrator
        .submit(fixtures::upload("ridge.laz"))
        .await
        .unwrap();
    h.wait_until_waiting(&id).await;
    h.orchestrator
        .raise_event(&id, "LiDARProcessingCompleted", fixtures::success_result(51.2, -1.8))
        .await
        .unwrap();
    let record = h.orchestrator.run_to_completion(&id).await.unwrap();

    assert_eq!(record.state, InstanceState::Completed);
    assert_eq!(record.analysis.unwrap().verdict, Verdict::Rejected);
    let site = h
        .store
        .get_site(record.site_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!site.is_possible_archaeological_site);
    assert_eq!(site.status, SiteStatus::Analyzed);
    // Discovery points only.
    assert_eq!(h.store.total_points("u1").await.unwrap(), 10);
}

#[tokio::test]
async fn test_unsupported_upload_is_terminal() {
    let h = TestHarness::new(fixtures::approving_panel());

    let id = h
        .orchestrator
        .submit(fixtures::upload("field_notes.docx"))
        .await
        .unwrap();
    let record = h.orchestrator.run_to_completion(&id).await.unwrap();

    assert_eq!(record.state, InstanceState::Unsupported);
    assert!(record.site_id.is_none());
    assert!(h.queue.published().await.is_empty());

    let types = h.audit_types(&id).await;
    assert_eq!(types.last().map(String::as_str), Some("job_unsupported"));
}

#[tokio::test]
async fn test_failed_processing_aborts() {
    let h = TestHarness::new(fixtures::approving_panel());

    let id = h
        .orchestrator
        .submit(fixtures::upload("mound_survey.las"))
        .await
        .unwrap();
    h.wait_until_waiting(&id).await;
    h.orchestrator
        .raise_event(
            &id,
            "LiDARProcessingCompleted",
            fixtures::failed_result("ground classification failed"),
        )
        .await
        .unwrap();
    let record = h.orchestrator.run_to_completion(&id).await.unwrap();

    assert_eq!(record.state, InstanceState::Aborted);
    assert!(h
        .store
        .get_site(record.site_id.as_deref().unwrap())
        .await
        .unwrap()
        .is_none());
    assert!(h.processor.calls().await.is_empty());
    assert!(h.client.recorded_requests().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_and_cancel() {
    let h = TestHarness::new(fixtures::approving_panel());

    let id = h
        .orchestrator
        .submit(fixtures::upload("mound_survey.las"))
        .await
        .unwrap();
    h.wait_until_waiting(&id).await;

    let duplicate = h
        .orchestrator
        .submit(fixtures::upload("mound_survey.las"))
        .await;
    assert!(duplicate.is_err());

    h.orchestrator.cancel(&id).await.unwrap();
    let record = h.orchestrator.run_to_completion(&id).await.unwrap();
    assert_eq!(record.state, InstanceState::Cancelled);

    // The late event no longer finds a waiter.
    assert!(h
        .orchestrator
        .raise_event(&id, "LiDARProcessingCompleted", fixtures::success_result(12.5, 77.2))
        .await
        .is_err());

    let types = h.audit_types(&id).await;
    assert_eq!(types.last().map(String::as_str), Some("job_cancelled"));
}
