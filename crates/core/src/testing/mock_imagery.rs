//! Mock imagery processor for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::imagery::{GeneratedImage, ImageryError, ImageryKind, ImageryProcessor, ImageryRequest};

/// A recorded generation call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedImageryCall {
    pub kind: ImageryKind,
    pub request: ImageryRequest,
}

/// Mock implementation of the ImageryProcessor trait.
///
/// Every kind succeeds with `https://imagery.test/<site>/<kind>.png` unless a
/// failure was queued for it with [`fail_kind`](Self::fail_kind).
#[derive(Debug)]
pub struct MockImageryProcessor {
    calls: Arc<RwLock<Vec<RecordedImageryCall>>>,
    /// One-shot failures, consumed by the next call for the kind.
    failures: Arc<RwLock<HashMap<ImageryKind, ImageryError>>>,
}

impl Default for MockImageryProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImageryProcessor {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fail the next call for `kind`.
    pub async fn fail_kind(&self, kind: ImageryKind, error: ImageryError) {
        self.failures.write().await.insert(kind, error);
    }

    pub async fn calls(&self) -> Vec<RecordedImageryCall> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl ImageryProcessor for MockImageryProcessor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        kind: ImageryKind,
        request: &ImageryRequest,
    ) -> Result<GeneratedImage, ImageryError> {
        self.calls.write().await.push(RecordedImageryCall {
            kind,
            request: request.clone(),
        });

        if let Some(error) = self.failures.write().await.remove(&kind) {
            return Err(error);
        }

        Ok(GeneratedImage {
            image_type: kind.as_str().to_string(),
            image_url: format!(
                "https://imagery.test/{}/{}.png",
                request.site_id,
                kind.endpoint_path()
            ),
            collection: Some(request.collection.clone()),
            processed_date: None,
            description: None,
        })
    }
}
