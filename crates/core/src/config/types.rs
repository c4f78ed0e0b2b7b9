use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    pub queue: QueueConfig,
    #[serde(default)]
    pub imagery: ImageryConfig,
    pub completion: CompletionConfig,
    #[serde(default)]
    pub deliberation: DeliberationConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Work queue the external raster processors consume from.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Endpoint job descriptors are POSTed to.
    pub endpoint: String,
    /// Container URL uploaded files live under; the job's blob URI is
    /// `<blob_container_url>/<file name>`.
    pub blob_container_url: String,
    #[serde(default = "default_queue_timeout")]
    pub timeout_secs: u64,
}

fn default_queue_timeout() -> u64 {
    30
}

/// Satellite imagery generation service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageryConfig {
    /// Run the imagery sub-orchestration when coordinates are known.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base URL of the imagery processor. Imagery is skipped when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_imagery_timeout")]
    pub timeout_secs: u64,
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            timeout_secs: default_imagery_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_imagery_timeout() -> u64 {
    120
}

/// Vision/text completion provider used by image analysis and the panel.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CompletionConfig {
    #[serde(default = "default_provider")]
    pub provider: CompletionProvider,
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionProvider {
    Anthropic,
}

fn default_provider() -> CompletionProvider {
    CompletionProvider::Anthropic
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f32 {
    0.3
}

fn default_completion_timeout() -> u64 {
    120
}

/// Specialist panel settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliberationConfig {
    /// Hard cap on speaker selections; the coordinator is forced to
    /// summarize once it is reached.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_max_rounds() -> u32 {
    5
}

/// Points awarded to the uploading user.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    /// Awarded for every analyzed site, regardless of verdict.
    #[serde(default = "default_discovery_points")]
    pub discovery_points: u32,
    /// Awarded only when the panel approves the site.
    #[serde(default = "default_approval_bonus")]
    pub approval_bonus: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            discovery_points: default_discovery_points(),
            approval_bonus: default_approval_bonus(),
        }
    }
}

fn default_discovery_points() -> u32 {
    10
}

fn default_approval_bonus() -> u32 {
    100
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub orchestrator: OrchestratorConfig,
    pub queue: QueueConfig,
    pub imagery: ImageryConfig,
    pub completion: SanitizedCompletionConfig,
    pub deliberation: DeliberationConfig,
    pub scoring: ScoringConfig,
}

/// Completion config with the API key hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCompletionConfig {
    pub provider: CompletionProvider,
    pub model: String,
    pub api_base: Option<String>,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            orchestrator: config.orchestrator.clone(),
            queue: config.queue.clone(),
            imagery: config.imagery.clone(),
            completion: SanitizedCompletionConfig {
                provider: config.completion.provider,
                model: config.completion.model.clone(),
                api_base: config.completion.api_base.clone(),
                api_key_configured: !config.completion.api_key.is_empty(),
            },
            deliberation: config.deliberation.clone(),
            scoring: config.scoring.clone(),
        }
    }
}
