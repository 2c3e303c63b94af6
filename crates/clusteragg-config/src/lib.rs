//! Configuration management for clusteragg
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (CAGG_* prefix, highest precedence)
//! 2. clusteragg.local.toml (local overrides)
//! 3. clusteragg.toml (project config)
//! 4. ~/.config/clusteragg/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, Paths};

/// Main clusteragg configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterAggConfig {
    pub aggregation: AggregationConfig,
    pub rebalance: RebalanceConfig,
}

/// The `[aggregation]` section: the ingestion listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub host: String,
    pub port: u16,
    pub backlog: u32,
    pub min_connection_timeout_secs: u64,
    pub max_connection_timeout_secs: u64,
    pub event_channel_capacity: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7065,
            backlog: 15,
            min_connection_timeout_secs: 30 * 60,
            max_connection_timeout_secs: 60 * 60,
            event_channel_capacity: 1024,
        }
    }
}

impl AggregationConfig {
    /// The socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "aggregation.host {:?} is not an IP address",
                self.host
            ))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn min_connection_lifetime(&self) -> Duration {
        Duration::from_secs(self.min_connection_timeout_secs)
    }

    pub fn max_connection_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_connection_timeout_secs)
    }
}

/// The `[rebalance]` section: shard allocation strategy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
    /// Cap on concurrently in-flight shard moves.
    pub max_parallel: usize,
    /// Minimum shard-count difference that triggers a move.
    pub threshold: usize,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            max_parallel: 100,
            threshold: 500,
        }
    }
}

impl ClusterAggConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from a specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Read a single TOML file without layering.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the listener or the strategy would refuse at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let aggregation = &self.aggregation;
        if aggregation.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "aggregation.host must not be empty".to_string(),
            ));
        }
        aggregation.bind_addr()?;
        if aggregation.port == 0 {
            return Err(ConfigError::ValidationError(
                "aggregation.port must not be 0".to_string(),
            ));
        }
        if aggregation.min_connection_timeout_secs > aggregation.max_connection_timeout_secs {
            return Err(ConfigError::ValidationError(format!(
                "aggregation.min_connection_timeout_secs ({}) exceeds max_connection_timeout_secs ({})",
                aggregation.min_connection_timeout_secs, aggregation.max_connection_timeout_secs
            )));
        }
        if aggregation.event_channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "aggregation.event_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.rebalance.max_parallel < 1 {
            return Err(ConfigError::ValidationError(
                "rebalance.max_parallel must be at least 1".to_string(),
            ));
        }
        if self.rebalance.threshold < 2 {
            return Err(ConfigError::ValidationError(format!(
                "rebalance.threshold must be at least 2, got {}",
                self.rebalance.threshold
            )));
        }
        Ok(())
    }
}
