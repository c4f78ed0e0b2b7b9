//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the site processing orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// How long an instance waits for the processors' completion event
    /// (seconds). 0 waits forever.
    #[serde(default = "default_external_event_timeout")]
    pub external_event_timeout_secs: u64,

    /// Maximum concurrently running instances (0 = unlimited).
    #[serde(default)]
    pub max_instances: usize,

    /// Capacity of the audit event channel.
    #[serde(default = "default_audit_buffer_size")]
    pub audit_buffer_size: usize,

    /// Finished instance records kept for `/jobs`; the oldest are evicted
    /// first (0 = keep all).
    #[serde(default = "default_retained_instances")]
    pub retained_instances: usize,
}

fn default_external_event_timeout() -> u64 {
    21_600 // 6 hours
}

fn default_audit_buffer_size() -> usize {
    1000
}

fn default_retained_instances() -> usize {
    1000
}

impl OrchestratorConfig {
    /// Bounded wait for the external event, `None` when disabled.
    pub fn external_event_timeout(&self) -> Option<Duration> {
        match self.external_event_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            external_event_timeout_secs: default_external_event_timeout(),
            max_instances: 0,
            audit_buffer_size: default_audit_buffer_size(),
            retained_instances: default_retained_instances(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.external_event_timeout_secs, 21_600);
        assert_eq!(
            config.external_event_timeout(),
            Some(Duration::from_secs(21_600))
        );
        assert_eq!(config.max_instances, 0);
        assert_eq!(config.audit_buffer_size, 1000);
        assert_eq!(config.retained_instances, 1000);
    }

    #[test]
    fn test_zero_timeout_is_unbounded() {
        let toml = r#"
            external_event_timeout_secs = 0
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.external_event_timeout(), None);
        assert_eq!(config.audit_buffer_size, 1000);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            external_event_timeout_secs = 600
            max_instances = 4
            audit_buffer_size = 50
            retained_instances = 20
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.external_event_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.max_instances, 4);
        assert_eq!(config.audit_buffer_size, 50);
        assert_eq!(config.retained_instances, 20);
    }
}
