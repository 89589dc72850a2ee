//! Partition assignment strategies for consumer groups
//!
//! This module provides the partition assignment strategies used during
//! rebalancing:
//!
//! - `RangeAssignor`: contiguous partition blocks per consumer
//! - `RoundRobinAssignor`: partitions dealt out one by one
//! - `StickyAssignor`: minimizes partition movement across rebalances
//!
//! ## Sticky Assignment
//!
//! The `StickyAssignor` maintains partition stickiness by:
//! 1. Preserving existing assignments when possible
//! 2. Only moving partitions when necessary for balance
//!
//! This reduces unnecessary partition movement during rebalances, improving
//! consumer group stability and reducing duplicate processing.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Partition-to-consumer mapping for one group.
///
/// Index is the partition, value is the owning consumer. A complete
/// assignment covers every partition in `[0, partition_count)` exactly once
/// with consumer indices in `[0, consumer_count)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    mapping: Vec<u32>,
}

impl Assignment {
    pub fn new(mapping: Vec<u32>) -> Self {
        Self { mapping }
    }

    /// An assignment covering no partitions; every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Consumer owning `partition`, if the assignment covers it.
    pub fn consumer_for(&self, partition: u32) -> Option<u32> {
        self.mapping.get(partition as usize).copied()
    }

    /// Partitions owned by `consumer`, ascending.
    pub fn partitions_of(&self, consumer: u32) -> Vec<u32> {
        self.mapping
            .iter()
            .enumerate()
            .filter(|(_, &owner)| owner == consumer)
            .map(|(partition, _)| partition as u32)
            .collect()
    }

    /// Number of partitions this assignment covers.
    pub fn partition_count(&self) -> u32 {
        self.mapping.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Iterate `(partition, consumer)` pairs in partition order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.mapping
            .iter()
            .enumerate()
            .map(|(partition, &consumer)| (partition as u32, consumer))
    }

    /// Count of partitions whose owner differs from `previous` (partitions
    /// not covered by `previous` count as moved).
    pub fn moved_since(&self, previous: &Assignment) -> usize {
        self.iter()
            .filter(|&(partition, consumer)| previous.consumer_for(partition) != Some(consumer))
            .count()
    }
}

/// Rebalance strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Range,
    RoundRobin,
    Sticky,
}

impl Strategy {
    /// Parse a strategy name; unknown names fall back to round-robin.
    pub fn from_name(name: &str) -> Self {
        match name {
            "range" => Strategy::Range,
            "roundrobin" => Strategy::RoundRobin,
            "sticky" => Strategy::Sticky,
            other => {
                warn!(strategy = other, "unknown assignment strategy, falling back to round-robin");
                Strategy::RoundRobin
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Range => "range",
            Strategy::RoundRobin => "roundrobin",
            Strategy::Sticky => "sticky",
        }
    }

    /// The assignor implementing this strategy.
    pub fn assignor(&self) -> &'static dyn PartitionAssignor {
        match self {
            Strategy::Range => &RangeAssignor,
            Strategy::RoundRobin => &RoundRobinAssignor,
            Strategy::Sticky => &StickyAssignor,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for partition assignment strategies.
///
/// Implementations are pure: identical inputs yield identical assignments.
pub trait PartitionAssignor: Send + Sync {
    /// Assign every partition in `[0, partition_count)` to a consumer in
    /// `[0, consumer_count)`.
    fn assign(&self, partition_count: u32, consumer_count: u32, previous: &Assignment)
        -> Assignment;
}

/// Range assignment strategy
///
/// Partitions are split into contiguous blocks, one per consumer. The first
/// `partition_count % consumer_count` consumers receive one extra partition.
/// Ignores the previous assignment.
pub struct RangeAssignor;

impl PartitionAssignor for RangeAssignor {
    fn assign(
        &self,
        partition_count: u32,
        consumer_count: u32,
        _previous: &Assignment,
    ) -> Assignment {
        if consumer_count == 0 {
            return Assignment::empty();
        }
        let base = partition_count / consumer_count;
        let extra = partition_count % consumer_count;

        let mut mapping = Vec::with_capacity(partition_count as usize);
        for consumer in 0..consumer_count {
            let block = base + u32::from(consumer < extra);
            for _ in 0..block {
                mapping.push(consumer);
            }
        }
        Assignment::new(mapping)
    }
}

/// Round-robin assignment strategy
///
/// Deals partitions out one by one: partition `p` goes to consumer
/// `p % consumer_count`. Ignores the previous assignment.
pub struct RoundRobinAssignor;

impl PartitionAssignor for RoundRobinAssignor {
    fn assign(
        &self,
        partition_count: u32,
        consumer_count: u32,
        _previous: &Assignment,
    ) -> Assignment {
        if consumer_count == 0 {
            return Assignment::empty();
        }
        Assignment::new((0..partition_count).map(|p| p % consumer_count).collect())
    }
}

/// Sticky partition assignor
///
/// Minimizes partition movement relative to the previous assignment while
/// still producing a balanced mapping:
/// 1. Keep every previous entry whose consumer index is still valid
/// 2. Hand each orphaned partition to the least-loaded consumer
///    (ties broken by lowest consumer index)
/// 3. Strip consumers above `ceil(partition_count / consumer_count)` of
///    their surplus, lowest partition indices kept, and hand each moved
///    partition to the currently least-loaded consumer
pub struct StickyAssignor;

impl PartitionAssignor for StickyAssignor {
    fn assign(
        &self,
        partition_count: u32,
        consumer_count: u32,
        previous: &Assignment,
    ) -> Assignment {
        if consumer_count == 0 {
            return Assignment::empty();
        }
        let partitions = partition_count as usize;
        let consumers = consumer_count as usize;

        let mut mapping: Vec<Option<u32>> = vec![None; partitions];
        let mut counts = vec![0usize; consumers];

        // Keep valid previous owners.
        for partition in 0..partition_count {
            if let Some(owner) = previous.consumer_for(partition) {
                if owner < consumer_count {
                    mapping[partition as usize] = Some(owner);
                    counts[owner as usize] += 1;
                }
            }
        }

        // Orphans go to the least-loaded consumer.
        for slot in mapping.iter_mut() {
            if slot.is_none() {
                let target = least_loaded(&counts);
                *slot = Some(target as u32);
                counts[target] += 1;
            }
        }

        // Rebalance surplus beyond the per-consumer target.
        let target = partitions.div_ceil(consumers);
        for consumer in 0..consumers {
            while counts[consumer] > target {
                let mut kept = 0;
                let mut moved = false;
                for slot in mapping.iter_mut() {
                    if *slot == Some(consumer as u32) {
                        kept += 1;
                        if kept > target {
                            let dest = least_loaded(&counts);
                            *slot = Some(dest as u32);
                            counts[consumer] -= 1;
                            counts[dest] += 1;
                            moved = true;
                            break;
                        }
                    }
                }
                if !moved {
                    break;
                }
            }
        }

        Assignment::new(mapping.into_iter().map(|slot| slot.unwrap_or(0)).collect())
    }
}

fn least_loaded(counts: &[usize]) -> usize {
    counts
        .iter()
        .enumerate()
        .min_by_key(|&(consumer, &count)| (count, consumer))
        .map(|(consumer, _)| consumer)
        .unwrap_or(0)
}
