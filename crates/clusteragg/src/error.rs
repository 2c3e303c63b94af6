//! Error types for the facade.

use clusteragg_config::ConfigError;
use clusteragg_server::ServerError;
use clusteragg_sharding::ShardingError;
use thiserror::Error;

/// Result type for [`ClusterAggregator`](crate::ClusterAggregator) operations.
pub type Result<T> = std::result::Result<T, ClusterAggError>;

#[derive(Debug, Error)]
pub enum ClusterAggError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("server error: {0}")]
    Server(#[from] ServerError),

    #[error("sharding error: {0}")]
    Sharding(#[from] ShardingError),
}
