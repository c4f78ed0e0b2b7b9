use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Queue endpoint and blob container are set
/// - Completion credentials are set
/// - Deliberation allows at least one round
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.queue.endpoint.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "queue.endpoint cannot be empty".to_string(),
        ));
    }

    if config.queue.blob_container_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "queue.blob_container_url cannot be empty".to_string(),
        ));
    }

    if config.completion.api_key.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "completion.api_key cannot be empty".to_string(),
        ));
    }

    if config.completion.model.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "completion.model cannot be empty".to_string(),
        ));
    }

    if config.deliberation.max_rounds == 0 {
        return Err(ConfigError::ValidationError(
            "deliberation.max_rounds must be at least 1".to_string(),
        ));
    }

    if let Some(endpoint) = &config.imagery.endpoint {
        if endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "imagery.endpoint cannot be empty when set".to_string(),
            ));
        }
    }

    Ok(())
}
