//! Unit tests for clusteragg-sharding

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use test_case::test_case;

use crate::{
    Allocations, ParallelLeastShardAllocationStrategy, RebalanceNotification, ShardId,
    ShardingError,
};

type Allocator = ParallelLeastShardAllocationStrategy<&'static str>;

fn shard_range(range: std::ops::Range<u64>) -> BTreeSet<ShardId> {
    range.map(ShardId::from).collect()
}

/// Region `a` owns `a_count` shards, region `b` owns the next `b_count`.
fn two_regions(a_count: u64, b_count: u64) -> Allocations<&'static str> {
    BTreeMap::from([
        ("a", shard_range(0..a_count)),
        ("b", shard_range(a_count..a_count + b_count)),
    ])
}

fn none() -> BTreeSet<ShardId> {
    BTreeSet::new()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn rejects_zero_parallelism() {
    assert_eq!(
        Allocator::new(0, 10).unwrap_err(),
        ShardingError::InvalidMaxParallel(0)
    );
}

#[test_case(0)]
#[test_case(1)]
fn rejects_threshold_below_two(threshold: usize) {
    assert_eq!(
        Allocator::new(5, threshold).unwrap_err(),
        ShardingError::InvalidThreshold(threshold)
    );
}

// ============================================================================
// allocate_shard
// ============================================================================

#[test]
fn allocates_to_least_loaded_region() {
    let strategy = Allocator::new(100, 10).unwrap();
    let current = two_regions(3, 1);

    let region = strategy
        .allocate_shard(&"a", &ShardId::from("new"), &current)
        .unwrap();
    assert_eq!(region, "b");
}

#[test]
fn allocation_ties_go_to_smallest_region() {
    let strategy = Allocator::new(100, 10).unwrap();
    let mut current = two_regions(0, 2);

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for id in 100u64..104 {
        let shard = ShardId::from(id);
        let region = strategy.allocate_shard(&"a", &shard, &current).unwrap();
        *counts.entry(region).or_default() += 1;
        current.get_mut(region).unwrap().insert(shard);
    }

    assert_eq!(counts.get("a"), Some(&3));
    assert_eq!(counts.get("b"), Some(&1));
}

#[test]
fn allocation_without_regions_fails() {
    let strategy = Allocator::new(100, 10).unwrap();
    let result = strategy.allocate_shard(&"a", &ShardId::from("7"), &BTreeMap::new());
    assert!(matches!(result, Err(ShardingError::NoRegions(id)) if id == "7"));
}

#[test]
fn allocation_of_pending_shard_is_idempotent() {
    let mut strategy = Allocator::new(5, 10).unwrap();
    let current = two_regions(10, 30);

    let moves = strategy.rebalance(&current, &none());
    let shard = moves.first().unwrap().clone();

    // Even though `a` has grown, the recorded destination is reused.
    let first = strategy.allocate_shard(&"b", &shard, &current).unwrap();
    let second = strategy.allocate_shard(&"b", &shard, &current).unwrap();
    assert_eq!(first, "a");
    assert_eq!(first, second);
}

#[test]
fn allocation_does_not_record_pending_moves() {
    let strategy = Allocator::new(100, 10).unwrap();
    strategy
        .allocate_shard(&"a", &ShardId::from("x"), &two_regions(1, 1))
        .unwrap();
    assert!(strategy.pending_rebalances().is_empty());
}

// ============================================================================
// rebalance
// ============================================================================

#[test]
fn moves_one_shard_at_exact_threshold() {
    let mut strategy = Allocator::new(100, 10).unwrap();
    let current = two_regions(10, 20);

    let moves = strategy.rebalance(&current, &none());

    assert_eq!(moves.len(), 1);
    assert!(moves.is_subset(&current["b"]));
}

#[test]
fn limited_by_max_parallel() {
    let mut strategy = Allocator::new(5, 10).unwrap();
    let current = two_regions(10, 30);

    let moves = strategy.rebalance(&current, &none());

    assert_eq!(moves.len(), 5);
    assert!(moves.is_subset(&current["b"]));
}

#[test]
fn in_flight_shards_reduce_the_budget() {
    let mut strategy = Allocator::new(5, 10).unwrap();
    let current = two_regions(10, 30);
    let in_progress = shard_range(10..13);

    let moves = strategy.rebalance(&current, &in_progress);

    assert_eq!(moves.len(), 2);
    assert!(moves.is_disjoint(&in_progress));
}

#[test]
fn stops_once_difference_drops_below_threshold() {
    let mut strategy = Allocator::new(100, 10).unwrap();
    let current = two_regions(10, 39);

    let moves = strategy.rebalance(&current, &none());

    // 10/39 becomes 20/29 after ten moves, a difference of 9.
    assert_eq!(moves.len(), 10);
}

#[test]
fn in_flight_shards_are_never_moved_again() {
    let mut strategy = Allocator::new(100, 5).unwrap();
    let current = two_regions(0, 50);
    let in_progress = shard_range(0..25);

    let moves = strategy.rebalance(&current, &in_progress);

    // Effective counts start at 0 and 25; eleven moves leave 11 and 14.
    assert_eq!(moves.len(), 11);
    assert!(moves.is_disjoint(&in_progress));
}

#[test]
fn second_round_counts_pending_as_incoming() {
    let mut strategy = Allocator::new(5, 10).unwrap();
    let current = two_regions(10, 30);

    let first = strategy.rebalance(&current, &none());
    assert_eq!(first.len(), 5);
    assert_eq!(strategy.pending_rebalances().len(), 5);
    assert!(strategy.pending_rebalances().values().all(|region| *region == "a"));

    // The coordinator now reports those five as in flight. The budget is
    // spent, so nothing else moves.
    let second = strategy.rebalance(&current, &first);
    assert!(second.is_empty());
    assert_eq!(strategy.pending_rebalances().len(), 5);
}

#[test_case(10, 1; "difference equal to threshold moves")]
#[test_case(11, 0; "difference below threshold does not move")]
fn threshold_boundary(threshold: usize, expected: usize) {
    let mut strategy = Allocator::new(10, threshold).unwrap();
    let current = two_regions(15, 25);

    let moves = strategy.rebalance(&current, &none());

    // 15/25 becomes 16/24 after one move, a difference of 8.
    assert_eq!(moves.len(), expected);
}

#[test]
fn pending_moves_count_as_incoming() {
    let mut strategy = Allocator::new(10, 10).unwrap();
    let current = two_regions(10, 30);

    // 10/30 becomes 16/24 after six moves.
    let first = strategy.rebalance(&current, &none());
    assert_eq!(first.len(), 6);

    // The coordinator has not applied the moves yet, so `current` is
    // unchanged. Without the incoming count `a` would look like 10 vs 24
    // and receive more shards.
    let second = strategy.rebalance(&current, &first);
    assert!(second.is_empty());
}

#[test]
fn donor_with_only_incoming_moves_is_passed_over() {
    let mut strategy = Allocator::new(10, 2).unwrap();
    let first_round = BTreeMap::from([("b", shard_range(0..10)), ("x", none())]);

    // 10/0 becomes 5/5.
    let first = strategy.rebalance(&first_round, &none());
    assert_eq!(first, shard_range(0..5));

    // `x` now counts five incoming moves but owns nothing it could give
    // away. `b` still holds five live shards against an empty `c`.
    let second_round = BTreeMap::from([
        ("b", shard_range(0..10)),
        ("c", none()),
        ("x", none()),
    ]);
    let second = strategy.rebalance(&second_round, &first);

    // 5/0 becomes 3/2.
    assert_eq!(second, shard_range(5..7));
    assert!(second.iter().all(|shard| strategy.pending_rebalances()[shard] == "c"));
}

#[test]
fn completed_moves_are_pruned() {
    let mut strategy = Allocator::new(5, 10).unwrap();
    let current = two_regions(10, 30);

    let first = strategy.rebalance(&current, &none());
    let mut still_moving = first.clone();
    let finished = still_moving.pop_first().unwrap();

    // The coordinator completed one move: `a` now owns that shard.
    let mut current = current;
    current.get_mut("b").unwrap().remove(&finished);
    current.get_mut("a").unwrap().insert(finished.clone());

    strategy.rebalance(&current, &still_moving);

    assert!(!strategy.pending_rebalances().contains_key(&finished));
    assert!(
        still_moving
            .iter()
            .all(|shard| strategy.pending_rebalances().contains_key(shard))
    );
}

#[test]
fn single_region_never_rebalances() {
    let mut strategy = Allocator::new(100, 2).unwrap();
    let current = BTreeMap::from([("a", shard_range(0..100))]);
    assert!(strategy.rebalance(&current, &none()).is_empty());
}

#[test]
fn empty_allocations_never_rebalance() {
    let mut strategy = Allocator::new(100, 2).unwrap();
    assert!(strategy.rebalance(&BTreeMap::new(), &none()).is_empty());
}

#[test]
fn empty_region_is_never_a_donor() {
    let mut strategy = Allocator::new(100, 2).unwrap();
    let current = BTreeMap::from([
        ("a", BTreeSet::new()),
        ("b", BTreeSet::new()),
        ("c", shard_range(0..1)),
    ]);

    // The largest difference is 1, below any valid threshold.
    assert!(strategy.rebalance(&current, &none()).is_empty());

    // With everything owned by `c` in flight, all regions are at zero.
    let in_progress = shard_range(0..1);
    assert!(strategy.rebalance(&current, &in_progress).is_empty());
}

#[test]
fn donor_ties_pick_the_largest_region() {
    let mut strategy = Allocator::new(1, 2).unwrap();
    let current = BTreeMap::from([
        ("a", BTreeSet::new()),
        ("b", shard_range(0..4)),
        ("c", shard_range(4..8)),
    ]);

    let moves = strategy.rebalance(&current, &none());

    assert_eq!(moves.len(), 1);
    assert!(moves.is_subset(&current["c"]));
    assert_eq!(strategy.pending_rebalances().values().next(), Some(&"a"));
}

#[test]
fn spreads_moves_across_regions() {
    let mut strategy = Allocator::new(100, 2).unwrap();
    let current = BTreeMap::from([
        ("a", BTreeSet::new()),
        ("b", BTreeSet::new()),
        ("c", shard_range(0..12)),
    ]);

    strategy.rebalance(&current, &none());

    let mut per_destination: BTreeMap<&str, usize> = BTreeMap::new();
    for destination in strategy.pending_rebalances().values() {
        *per_destination.entry(*destination).or_default() += 1;
    }
    // 0/0/12 settles at 4/4/4 or within one of it.
    assert!(per_destination["a"].abs_diff(per_destination["b"]) <= 1);
    assert!(per_destination["a"] + per_destination["b"] >= 7);
}

// ============================================================================
// Notifications
// ============================================================================

#[test]
fn notifies_with_snapshot_of_the_round() {
    let received: Arc<Mutex<Vec<RebalanceNotification<&'static str>>>> = Arc::default();
    let sink = Arc::clone(&received);
    let mut strategy = Allocator::new(5, 10)
        .unwrap()
        .with_notifier(move |n| sink.lock().unwrap().push(n));

    let current = two_regions(10, 30);
    let in_progress = shard_range(10..12);
    let moves = strategy.rebalance(&current, &in_progress);

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    let notification = &received[0];
    assert_eq!(notification.current_allocations, current);
    assert_eq!(notification.in_flight_rebalances, in_progress);
    assert_eq!(
        notification.pending_rebalances.keys().cloned().collect::<BTreeSet<_>>(),
        moves
    );
}

#[test]
fn notifies_even_when_nothing_moves() {
    let count = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&count);
    let mut strategy = Allocator::new(5, 10)
        .unwrap()
        .with_notifier(move |_: RebalanceNotification<&'static str>| {
            *sink.lock().unwrap() += 1;
        });

    strategy.rebalance(&two_regions(5, 5), &none());
    assert_eq!(*count.lock().unwrap(), 1);
}

// ============================================================================
// Property Tests
// ============================================================================

fn arb_allocations() -> impl Strategy<Value = Allocations<&'static str>> {
    const REGIONS: [&str; 5] = ["r0", "r1", "r2", "r3", "r4"];
    proptest::collection::vec(0u64..60, 1..=REGIONS.len()).prop_map(|sizes| {
        let mut next = 0;
        sizes
            .into_iter()
            .enumerate()
            .map(|(i, size)| {
                let shards = shard_range(next..next + size);
                next += size;
                (REGIONS[i], shards)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn never_exceeds_budget_or_moves_in_flight_shards(
        current in arb_allocations(),
        max_parallel in 1usize..20,
        threshold in 2usize..20,
        in_flight_fraction in 0usize..4,
    ) {
        let all: Vec<ShardId> = current.values().flatten().cloned().collect();
        let in_progress: BTreeSet<ShardId> = all
            .iter()
            .enumerate()
            .filter(|(i, _)| in_flight_fraction > 0 && i % (in_flight_fraction * 3) == 0)
            .map(|(_, s)| s.clone())
            .collect();

        let mut strategy = Allocator::new(max_parallel, threshold).unwrap();
        let moves = strategy.rebalance(&current, &in_progress);

        prop_assert!(moves.len() <= max_parallel.saturating_sub(in_progress.len()));
        prop_assert!(moves.is_disjoint(&in_progress));
        prop_assert!(moves.iter().all(|s| all.contains(s)));
    }

    #[test]
    fn balanced_clusters_stay_put(
        base in 0u64..40,
        spread in proptest::collection::vec(0u64..5, 2..5),
    ) {
        // Every region within 4 of the others, threshold 5.
        let mut next = 0;
        let regions = ["r0", "r1", "r2", "r3"];
        let current: Allocations<&'static str> = spread
            .iter()
            .enumerate()
            .map(|(i, extra)| {
                let size = base + extra;
                let shards = shard_range(next..next + size);
                next += size;
                (regions[i], shards)
            })
            .collect();

        let mut strategy = Allocator::new(100, 5).unwrap();
        prop_assert!(strategy.rebalance(&current, &BTreeSet::new()).is_empty());
    }
}
