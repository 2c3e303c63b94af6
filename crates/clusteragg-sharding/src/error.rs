//! Error types for shard allocation.

use thiserror::Error;

/// Errors raised by the allocation strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShardingError {
    /// `allocate_shard` was called with no regions to choose from.
    #[error("no regions available to allocate shard {0}")]
    NoRegions(String),

    /// The parallelism limit must allow at least one move.
    #[error("invalid max parallel rebalances: {0} (must be >= 1)")]
    InvalidMaxParallel(usize),

    /// A threshold below two would move shards back and forth.
    #[error("invalid rebalance threshold: {0} (must be >= 2)")]
    InvalidThreshold(usize),
}

/// Result type for sharding operations.
pub type Result<T> = std::result::Result<T, ShardingError>;
