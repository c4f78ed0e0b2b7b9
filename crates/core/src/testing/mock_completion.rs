//! Mock completion client for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::completion::{CompletionClient, CompletionRequest, CompletionResponse, LlmError, LlmUsage};

/// Mock implementation of the CompletionClient trait.
///
/// Responses are served in the order they were pushed. Once the queue is
/// drained, the fallback text is returned if one is set; otherwise the call
/// fails.
///
/// # Example
///
/// ```rust,ignore
/// let client = MockCompletionClient::new();
/// client.push_text(r#"{"caption":"Ring ditch"}"#).await;
/// client.push_error(LlmError::Http("reset".into())).await;
///
/// let requests = client.recorded_requests().await;
/// ```
#[derive(Debug)]
pub struct MockCompletionClient {
    responses: Arc<RwLock<VecDeque<Result<String, LlmError>>>>,
    fallback: Arc<RwLock<Option<String>>>,
    requests: Arc<RwLock<Vec<CompletionRequest>>>,
}

impl Default for MockCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(VecDeque::new())),
            fallback: Arc::new(RwLock::new(None)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn push_text(&self, text: &str) {
        self.responses.write().await.push_back(Ok(text.to_string()));
    }

    pub async fn push_error(&self, error: LlmError) {
        self.responses.write().await.push_back(Err(error));
    }

    /// Text returned once the scripted responses run out.
    pub async fn set_fallback(&self, text: &str) {
        *self.fallback.write().await = Some(text.to_string());
    }

    pub async fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-vision"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.write().await.push(request);

        let next = self.responses.write().await.pop_front();
        let text = match next {
            Some(response) => response?,
            None => match self.fallback.read().await.clone() {
                Some(text) => text,
                None => {
                    return Err(LlmError::Api {
                        status: 500,
                        message: "no scripted response".to_string(),
                    })
                }
            },
        };

        Ok(CompletionResponse {
            text,
            usage: LlmUsage::default(),
            model: self.model().to_string(),
        })
    }
}
