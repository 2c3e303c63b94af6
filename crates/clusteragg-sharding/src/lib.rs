//! # clusteragg-sharding: Shard allocation for `clusteragg`
//!
//! Aggregation work is partitioned into shards that live on processing
//! regions. The cluster coordinator asks the strategy two questions:
//!
//! - **Where does a new shard go?** [`ParallelLeastShardAllocationStrategy::allocate_shard`]
//! - **Which shards should move now?** [`ParallelLeastShardAllocationStrategy::rebalance`]
//!
//! # Example
//!
//! ```
//! use std::collections::{BTreeMap, BTreeSet};
//! use clusteragg_sharding::{ParallelLeastShardAllocationStrategy, ShardId};
//!
//! let mut strategy = ParallelLeastShardAllocationStrategy::new(5, 10).unwrap();
//!
//! let a: BTreeSet<ShardId> = (0u64..10).map(ShardId::from).collect();
//! let b: BTreeSet<ShardId> = (10u64..40).map(ShardId::from).collect();
//! let current = BTreeMap::from([("a", a), ("b", b)]);
//!
//! let moves = strategy.rebalance(&current, &BTreeSet::new());
//! assert_eq!(moves.len(), 5);
//! ```

mod error;
mod notification;
mod strategy;

#[cfg(test)]
mod tests;

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

pub use error::{Result, ShardingError};
pub use notification::{
    BroadcastNotifier, RebalanceNotification, RebalanceNotifier, ShardAllocation,
};
pub use strategy::{Allocations, ParallelLeastShardAllocationStrategy};

/// Identifier of a logical shard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShardId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ShardId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for ShardId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}
