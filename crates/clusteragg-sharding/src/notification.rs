//! Rebalance notifications and the per-region allocation view.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::ShardId;

/// Snapshot of one rebalance decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebalanceNotification<N: Ord> {
    /// Allocations as they were passed into the `rebalance` call.
    pub current_allocations: BTreeMap<N, BTreeSet<ShardId>>,
    /// Shards the caller reported as mid-rebalance.
    pub in_flight_rebalances: BTreeSet<ShardId>,
    /// Every pending move after this round, including the new ones.
    pub pending_rebalances: BTreeMap<ShardId, N>,
    pub timestamp: DateTime<Utc>,
}

/// Shard ownership of a single region as seen by a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardAllocation<N> {
    pub region: N,
    /// Owned shards that are not moving away.
    pub current: BTreeSet<ShardId>,
    /// Shards on their way to this region.
    pub incoming: BTreeSet<ShardId>,
    /// Owned shards on their way elsewhere.
    pub outgoing: BTreeSet<ShardId>,
}

impl<N: Ord + Clone> RebalanceNotification<N> {
    /// Derives the per-region allocation view.
    ///
    /// Regions are the union of current owners and pending destinations,
    /// returned in region order.
    pub fn shard_allocations(&self) -> Vec<ShardAllocation<N>> {
        let mut regions: BTreeMap<&N, ShardAllocation<N>> = BTreeMap::new();

        for (region, shards) in &self.current_allocations {
            let (outgoing, current): (BTreeSet<ShardId>, BTreeSet<ShardId>) = shards
                .iter()
                .cloned()
                .partition(|shard| self.pending_rebalances.contains_key(shard));
            regions.insert(
                region,
                ShardAllocation {
                    region: region.clone(),
                    current,
                    incoming: BTreeSet::new(),
                    outgoing,
                },
            );
        }

        for (shard, destination) in &self.pending_rebalances {
            regions
                .entry(destination)
                .or_insert_with(|| ShardAllocation {
                    region: destination.clone(),
                    current: BTreeSet::new(),
                    incoming: BTreeSet::new(),
                    outgoing: BTreeSet::new(),
                })
                .incoming
                .insert(shard.clone());
        }

        regions.into_values().collect()
    }
}

// ============================================================================
// Notifiers
// ============================================================================

/// Receives rebalance notifications. Delivery is fire-and-forget.
pub trait RebalanceNotifier<N: Ord>: Send {
    fn notify(&self, notification: RebalanceNotification<N>);
}

impl<N, F> RebalanceNotifier<N> for F
where
    N: Ord,
    F: Fn(RebalanceNotification<N>) + Send,
{
    fn notify(&self, notification: RebalanceNotification<N>) {
        self(notification);
    }
}

/// Fans notifications out to every subscriber of a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier<N: Ord> {
    sender: broadcast::Sender<RebalanceNotification<N>>,
}

impl<N: Ord + Clone> BroadcastNotifier<N> {
    /// Creates a notifier with its own channel of the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RebalanceNotification<N>> {
        self.sender.subscribe()
    }
}

impl<N: Ord> From<broadcast::Sender<RebalanceNotification<N>>> for BroadcastNotifier<N> {
    fn from(sender: broadcast::Sender<RebalanceNotification<N>>) -> Self {
        Self { sender }
    }
}

impl<N: Ord + Clone + Send> RebalanceNotifier<N> for BroadcastNotifier<N> {
    fn notify(&self, notification: RebalanceNotification<N>) {
        if self.sender.send(notification).is_err() {
            debug!("no rebalance notification subscribers");
        }
    }
}
