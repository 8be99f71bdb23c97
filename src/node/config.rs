//! Node configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::Level;

use crate::network::gossip::GossipConfig;
use crate::network::transport::TransportConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
}

/// Full node configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Dissemination configuration
    pub gossip: GossipConfig,

    /// Transport configuration
    pub transport: TransportConfig,

    /// Logging configuration
    pub log: LogConfig,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Maximum level: trace, debug, info, warn or error
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogConfig {
    /// Parsed maximum level.
    pub fn max_level(&self) -> Result<Level, ConfigError> {
        self.level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.level.clone()))
    }
}

impl NodeConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.log.max_level()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();

        assert_eq!(config.gossip.retry_interval_ms, 1000);
        assert_eq!(config.transport.rpc_timeout_ms, 5000);
        assert_eq!(config.log.max_level().unwrap(), Level::INFO);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"gossip":{{"retry_interval_ms":250}},"log":{{"level":"debug"}}}}"#)
            .unwrap();

        let config = NodeConfig::load(file.path()).unwrap();

        assert_eq!(config.gossip.retry_interval_ms, 250);
        assert_eq!(config.transport.cleanup_interval_ms, 1000);
        assert_eq!(config.log.max_level().unwrap(), Level::DEBUG);
    }

    #[test]
    fn test_load_rejects_bad_level() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"log":{{"level":"loud"}}}}"#).unwrap();

        assert!(matches!(
            NodeConfig::load(file.path()),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = NodeConfig::load(dir.path().join("absent.json"));

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn test_config_serialization() {
        let config = NodeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let recovered: NodeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(config.gossip.retry_interval_ms, recovered.gossip.retry_interval_ms);
    }
}
