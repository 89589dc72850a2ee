//! Consumer lag projection.
//!
//! Lag is the set of filter-eligible messages a group has not yet
//! processed, measured as a count and as the age of the oldest such
//! message. Everything here is a pure read-side projection over the
//! message log and group state; nothing is mutated.

use crate::consumer::group::GroupState;
use crate::consumer::rebalance::Assignment;
use crate::log::MessageLog;
use serde::{Deserialize, Serialize};

/// Lag of one group behind one partition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionLag {
    /// Partition ID
    pub partition: u32,
    /// Eligible messages not yet processed by the group
    pub count: usize,
    /// Age of the oldest unprocessed message in milliseconds (0 if none)
    pub lag_ms: u64,
}

/// Lag rollup for a group (or for one consumer's share of a group).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupLag {
    /// Group ID
    pub group_id: String,
    /// Per-partition lag, ascending by partition
    pub partitions: Vec<PartitionLag>,
    /// Total unprocessed count across partitions
    pub total: usize,
    /// Worst per-partition age in milliseconds
    pub max_lag_ms: u64,
}

impl GroupLag {
    fn from_partitions(group_id: &str, partitions: Vec<PartitionLag>) -> Self {
        let total = partitions.iter().map(|p| p.count).sum();
        let max_lag_ms = partitions.iter().map(|p| p.lag_ms).max().unwrap_or(0);
        Self {
            group_id: group_id.to_string(),
            partitions,
            total,
            max_lag_ms,
        }
    }
}

/// Lag of `group` behind one partition at time `now_ms`.
pub fn partition_lag(
    log: &MessageLog,
    group: &GroupState,
    partition: u32,
    now_ms: u64,
) -> PartitionLag {
    let mut count = 0;
    let mut oldest: Option<u64> = None;
    for message in log.messages(partition) {
        if group.needs(message) {
            count += 1;
            oldest = Some(match oldest {
                Some(at) => at.min(message.produced_at),
                None => message.produced_at,
            });
        }
    }
    PartitionLag {
        partition,
        count,
        lag_ms: oldest.map_or(0, |at| now_ms.saturating_sub(at)),
    }
}

/// Lag of `group` across every partition in `[0, partition_count)`.
pub fn group_lag(
    log: &MessageLog,
    group: &GroupState,
    partition_count: u32,
    now_ms: u64,
) -> GroupLag {
    let partitions = (0..partition_count)
        .map(|p| partition_lag(log, group, p, now_ms))
        .collect();
    GroupLag::from_partitions(group.id(), partitions)
}

/// Lag of one consumer's share of a group, per its current assignment.
pub fn consumer_lag(
    log: &MessageLog,
    group: &GroupState,
    assignment: &Assignment,
    consumer: u32,
    now_ms: u64,
) -> GroupLag {
    let partitions = assignment
        .partitions_of(consumer)
        .into_iter()
        .map(|p| partition_lag(log, group, p, now_ms))
        .collect();
    GroupLag::from_partitions(group.id(), partitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::group::GroupSpec;
    use std::collections::BTreeMap;

    fn fields(account: &str) -> BTreeMap<String, String> {
        let mut f = BTreeMap::new();
        f.insert("account_id".to_string(), account.to_string());
        f
    }

    #[test]
    fn test_lag_counts_unprocessed() {
        let mut log = MessageLog::new();
        log.append(0, "a".to_string(), fields("acc_001"), 1_000);
        log.append(0, "b".to_string(), fields("acc_002"), 2_000);
        let mut group = GroupState::new(GroupSpec::new("orders-service", 1));

        let lag = partition_lag(&log, &group, 0, 5_000);
        assert_eq!(lag.count, 2);
        assert_eq!(lag.lag_ms, 4_000);

        // Half processed: oldest remaining is the later message.
        group.process_tick(&mut log, &Assignment::new(vec![0]), 0.5, 5_000);
        let lag = partition_lag(&log, &group, 0, 5_000);
        assert_eq!(lag.count, 1);
        assert_eq!(lag.lag_ms, 3_000);
    }

    #[test]
    fn test_lag_zero_when_caught_up() {
        let mut log = MessageLog::new();
        log.append(0, "a".to_string(), fields("acc_001"), 1_000);
        let mut group = GroupState::new(GroupSpec::new("orders-service", 1));
        group.process_tick(&mut log, &Assignment::new(vec![0]), 1.0, 2_000);

        let lag = partition_lag(&log, &group, 0, 9_000);
        assert_eq!(lag.count, 0);
        assert_eq!(lag.lag_ms, 0);
    }

    #[test]
    fn test_filtered_group_ignores_ineligible() {
        let mut log = MessageLog::new();
        log.append(0, "acc_002".to_string(), fields("acc_002"), 1_000);
        let group = GroupState::new(GroupSpec::with_filter("account-001-processor", 1, "acc_001"));

        let lag = partition_lag(&log, &group, 0, 5_000);
        assert_eq!(lag.count, 0);
        assert_eq!(lag.lag_ms, 0);
    }

    #[test]
    fn test_group_lag_rollup() {
        let mut log = MessageLog::new();
        log.append(0, "a".to_string(), fields("acc_001"), 1_000);
        log.append(1, "b".to_string(), fields("acc_002"), 2_000);
        log.append(1, "c".to_string(), fields("acc_003"), 3_000);
        let group = GroupState::new(GroupSpec::new("orders-service", 1));

        let lag = group_lag(&log, &group, 3, 4_000);
        assert_eq!(lag.total, 3);
        assert_eq!(lag.max_lag_ms, 3_000);
        assert_eq!(lag.partitions.len(), 3);
        assert_eq!(lag.partitions[2].count, 0);
    }

    #[test]
    fn test_consumer_lag_covers_assigned_share_only() {
        let mut log = MessageLog::new();
        log.append(0, "a".to_string(), fields("acc_001"), 1_000);
        log.append(1, "b".to_string(), fields("acc_002"), 1_000);
        let group = GroupState::new(GroupSpec::new("orders-service", 2));
        let assignment = Assignment::new(vec![0, 1]);

        let lag = consumer_lag(&log, &group, &assignment, 0, 2_000);
        assert_eq!(lag.total, 1);
        assert_eq!(lag.partitions[0].partition, 0);

        let lag = consumer_lag(&log, &group, &assignment, 1, 2_000);
        assert_eq!(lag.total, 1);
        assert_eq!(lag.partitions[0].partition, 1);
    }
}
