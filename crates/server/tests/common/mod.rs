//! Shared fixture for HTTP tests.
//!
//! Builds the real router around an orchestrator whose collaborators are
//! the in-memory mocks from `stratum_core::testing`, so whole jobs can be
//! driven over HTTP without a queue, an imagery service or a model API.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use stratum_core::{
    activities::Activities,
    analysis::{AnalysisSubOrchestrator, ImageGroupAnalyzer},
    create_audit_system,
    imagery::ImagerySubOrchestrator,
    load_config_from_str,
    site::MemorySiteStore,
    testing::{MockCompletionClient, MockImageryProcessor, MockWorkQueue, ScriptedPanel},
    AuditStore, CorrelationEventBus, MemoryAuditStore, SiteOrchestrator, SiteProcessingWorkflow,
};
use stratum_server::{create_router, AppState};

pub use stratum_core::testing::fixtures;

const TEST_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 8080

[orchestrator]
max_instances = 4

[queue]
endpoint = "http://queue.test/jobs"
blob_container_url = "https://blobs.test/uploads"

[imagery]
endpoint = "http://imagery.test"

[completion]
api_key = "sk-test-secret"
model = "vision-test"
"#;

pub struct TestFixture {
    pub router: Router,
    pub store: Arc<MemorySiteStore>,
    pub queue: Arc<MockWorkQueue>,
    pub client: Arc<MockCompletionClient>,
    pub processor: Arc<MockImageryProcessor>,
    pub orchestrator: Arc<SiteOrchestrator>,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Fixture whose panel approves every site.
    pub async fn new() -> Self {
        Self::with_panel(fixtures::approving_panel()).await
    }

    pub async fn with_panel(panel: ScriptedPanel) -> Self {
        let config = load_config_from_str(TEST_CONFIG).expect("test config parses");

        let store = Arc::new(MemorySiteStore::new());
        let queue = Arc::new(MockWorkQueue::new());
        let client = Arc::new(MockCompletionClient::new());
        client.set_fallback(fixtures::TOPOGRAPHY_RESPONSE).await;
        let processor = Arc::new(MockImageryProcessor::new());

        let audit_store: Arc<dyn AuditStore> = Arc::new(MemoryAuditStore::default());
        let (audit, writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(writer.run());

        let activities = Activities::from_store(store.clone());
        let bus = Arc::new(CorrelationEventBus::new(
            queue.clone(),
            config.queue.blob_container_url.clone(),
        ));
        let imagery = Arc::new(ImagerySubOrchestrator::new(
            processor.clone(),
            activities.clone(),
        ));
        let analysis = Arc::new(
            AnalysisSubOrchestrator::new(
                ImageGroupAnalyzer::new(client.clone()),
                Arc::new(panel),
                activities.clone(),
            )
            .with_scoring(config.scoring.clone()),
        );
        let workflow =
            SiteProcessingWorkflow::new(bus, activities, analysis).with_imagery(imagery);
        let orchestrator = Arc::new(SiteOrchestrator::new(
            config.orchestrator.clone(),
            workflow,
            Some(audit),
        ));

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&orchestrator),
            audit_store,
        ));
        let router = create_router(state);

        Self {
            router,
            store,
            queue,
            client,
            processor,
            orchestrator,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with a raw body (for malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// GET returning the raw text body (for `/metrics`).
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Submit an upload and return its instance id.
    pub async fn submit(&self, file_name: &str) -> String {
        let body = serde_json::to_value(fixtures::upload(file_name)).unwrap();
        let response = self.post("/api/v1/jobs", body).await;
        assert_eq!(response.status, StatusCode::ACCEPTED, "{:?}", response.body);
        response.body["instance_id"].as_str().unwrap().to_string()
    }

    /// Poll the job until `pred` holds for its JSON record.
    pub async fn wait_for_job(&self, id: &str, pred: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..500 {
            let response = self.get(&format!("/api/v1/jobs/{}", id)).await;
            assert_eq!(response.status, StatusCode::OK);
            if pred(&response.body) {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never reached the expected state", id);
    }

    pub async fn wait_until_waiting(&self, id: &str) -> Value {
        self.wait_for_job(id, |job| job["stage"] == "await_external")
            .await
    }

    pub async fn wait_until_finished(&self, id: &str) -> Value {
        self.wait_for_job(id, |job| job["state"] != "running").await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);

        let body = match body {
            Some(json_body) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&json_body).unwrap())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
