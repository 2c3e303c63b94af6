//! Least-loaded shard allocation with bounded parallel rebalancing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Debug};

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::error::{Result, ShardingError};
use crate::notification::{RebalanceNotification, RebalanceNotifier};
use crate::ShardId;

/// Shard ownership per region, as supplied by the cluster coordinator.
pub type Allocations<N> = BTreeMap<N, BTreeSet<ShardId>>;

/// Assigns new shards to the least-loaded region and moves shards from the
/// most-loaded to the least-loaded region, a bounded number at a time.
///
/// Regions are compared by their *effective* shard count: owned shards not
/// currently in flight, plus pending shards headed to the region. Ties are
/// broken by the region's `Ord`, so the smallest region wins when choosing
/// a destination and the largest when choosing a donor.
///
/// # Concurrency
///
/// The strategy keeps `pending_rebalances` between calls and takes `&mut
/// self` to update it. Callers serialize access to one instance; there is
/// no internal locking.
pub struct ParallelLeastShardAllocationStrategy<N: Ord> {
    max_parallel: usize,
    rebalance_threshold: usize,
    pending_rebalances: BTreeMap<ShardId, N>,
    notifier: Option<Box<dyn RebalanceNotifier<N>>>,
}

impl<N> ParallelLeastShardAllocationStrategy<N>
where
    N: Ord + Clone + Debug,
{
    /// Creates a strategy.
    ///
    /// # Errors
    ///
    /// Fails if `max_parallel` is zero or `rebalance_threshold` is below two.
    pub fn new(max_parallel: usize, rebalance_threshold: usize) -> Result<Self> {
        if max_parallel < 1 {
            return Err(ShardingError::InvalidMaxParallel(max_parallel));
        }
        if rebalance_threshold < 2 {
            return Err(ShardingError::InvalidThreshold(rebalance_threshold));
        }
        Ok(Self {
            max_parallel,
            rebalance_threshold,
            pending_rebalances: BTreeMap::new(),
            notifier: None,
        })
    }

    /// Attaches a notifier that receives a snapshot after every rebalance.
    pub fn with_notifier(mut self, notifier: impl RebalanceNotifier<N> + 'static) -> Self {
        self.notifier = Some(Box::new(notifier));
        self
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn rebalance_threshold(&self) -> usize {
        self.rebalance_threshold
    }

    /// Moves decided by earlier rounds that are still in flight.
    pub fn pending_rebalances(&self) -> &BTreeMap<ShardId, N> {
        &self.pending_rebalances
    }

    /// Chooses the region that should host `shard_id`.
    ///
    /// A shard with a pending move is always sent to its recorded
    /// destination. Otherwise the region owning the fewest shards wins.
    ///
    /// # Errors
    ///
    /// Returns [`ShardingError::NoRegions`] if `current` is empty.
    #[instrument(skip_all, fields(shard = %shard_id, regions = current.len()))]
    pub fn allocate_shard(
        &self,
        _requester: &N,
        shard_id: &ShardId,
        current: &Allocations<N>,
    ) -> Result<N> {
        if let Some(destination) = self.pending_rebalances.get(shard_id) {
            debug!(destination = ?destination, "shard has a pending rebalance");
            return Ok(destination.clone());
        }

        current
            .iter()
            .min_by_key(|(_, shards)| shards.len())
            .map(|(region, _)| region.clone())
            .ok_or_else(|| ShardingError::NoRegions(shard_id.to_string()))
    }

    /// Decides which shards to move this round.
    ///
    /// At most `max_parallel - in_progress.len()` shards are returned, and
    /// never one that is already in `in_progress`. Pending moves no longer
    /// reported as in progress are forgotten first.
    #[instrument(skip_all, fields(regions = current.len(), in_progress = in_progress.len()))]
    pub fn rebalance(
        &mut self,
        current: &Allocations<N>,
        in_progress: &BTreeSet<ShardId>,
    ) -> BTreeSet<ShardId> {
        self.pending_rebalances
            .retain(|shard, _| in_progress.contains(shard));

        let mut incoming: BTreeMap<&N, usize> = BTreeMap::new();
        for destination in self.pending_rebalances.values() {
            *incoming.entry(destination).or_default() += 1;
        }

        let mut movable: BTreeMap<&N, BTreeSet<&ShardId>> = BTreeMap::new();
        let mut order: BTreeSet<(usize, &N)> = BTreeSet::new();
        for (region, shards) in current {
            let live: BTreeSet<&ShardId> = shards
                .iter()
                .filter(|shard| !in_progress.contains(*shard))
                .collect();
            let effective = live.len() + incoming.get(region).copied().unwrap_or(0);
            order.insert((effective, region));
            movable.insert(region, live);
        }

        let budget = self.max_parallel.saturating_sub(in_progress.len());
        let mut decided = BTreeSet::new();

        while decided.len() < budget {
            if order.len() < 2 {
                debug!("fewer than two regions, nothing to rebalance");
                break;
            }
            let (Some(&least), Some(&most)) = (order.first(), order.last()) else {
                break;
            };
            let difference = most.0 - least.0;
            if difference < self.rebalance_threshold {
                debug!(
                    difference,
                    threshold = self.rebalance_threshold,
                    "regions balanced within threshold"
                );
                break;
            }
            let Some(shard) = movable.get_mut(most.1).and_then(BTreeSet::pop_first) else {
                // Its count is all incoming moves; try the next donor.
                debug!(region = ?most.1, "most loaded region has no movable shards");
                order.remove(&most);
                continue;
            };

            order.remove(&least);
            order.remove(&most);
            order.insert((least.0 + 1, least.1));
            order.insert((most.0 - 1, most.1));

            self.pending_rebalances.insert(shard.clone(), least.1.clone());
            decided.insert(shard.clone());
        }

        if !decided.is_empty() {
            info!(count = decided.len(), "rebalancing shards");
        }

        if let Some(notifier) = &self.notifier {
            notifier.notify(RebalanceNotification {
                current_allocations: current.clone(),
                in_flight_rebalances: in_progress.clone(),
                pending_rebalances: self.pending_rebalances.clone(),
                timestamp: Utc::now(),
            });
        }

        decided
    }
}

impl<N: Ord + Debug> Debug for ParallelLeastShardAllocationStrategy<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelLeastShardAllocationStrategy")
            .field("max_parallel", &self.max_parallel)
            .field("rebalance_threshold", &self.rebalance_threshold)
            .field("pending_rebalances", &self.pending_rebalances)
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}
