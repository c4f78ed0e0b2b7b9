//! Panel members backed by a completion client.

use std::sync::Arc;

use async_trait::async_trait;

use super::prompts::{render_transcript, role_instructions};
use super::types::{DeliberationError, PanelRole, Transcript};
use crate::completion::{CompletionClient, CompletionRequest};

/// Produces the next message for a panel role.
#[async_trait]
pub trait Panelist: Send + Sync {
    /// Panel name for logs.
    fn name(&self) -> &str;

    /// Respond as `role` to the transcript so far.
    async fn respond(
        &self,
        role: PanelRole,
        transcript: &Transcript,
    ) -> Result<String, DeliberationError>;
}

/// Every role is played by the same completion model with role-specific
/// instructions.
pub struct CompletionPanel {
    client: Arc<dyn CompletionClient>,
    max_tokens: u32,
    temperature: f32,
}

impl CompletionPanel {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            max_tokens: 1024,
            temperature: 0.3,
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
}

#[async_trait]
impl Panelist for CompletionPanel {
    fn name(&self) -> &str {
        self.client.model()
    }

    async fn respond(
        &self,
        role: PanelRole,
        transcript: &Transcript,
    ) -> Result<String, DeliberationError> {
        let request = CompletionRequest::new(render_transcript(transcript, role))
            .with_system(role_instructions(role))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);

        let response = self
            .client
            .complete(request)
            .await
            .map_err(|e| DeliberationError::Panelist {
                role,
                message: e.to_string(),
            })?;

        Ok(response.text)
    }
}
