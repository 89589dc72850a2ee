//! Consumer group data structures and per-tick processing.
//!
//! Each group consumes the full partition set independently: it owns its
//! committed offset counters, an at-most-once "processed" side table keyed
//! by global sequence number, and an optional content filter restricting
//! which messages it considers eligible.

use crate::consumer::rebalance::Assignment;
use crate::log::{Message, MessageLog};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Caller-facing description of a consumer group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Group ID
    pub id: String,
    /// Number of consumers in the group
    pub consumer_count: u32,
    /// Optional content filter: a message is eligible when its key or any
    /// field value contains this substring (case sensitive)
    pub filter: Option<String>,
}

impl GroupSpec {
    pub fn new(id: impl Into<String>, consumer_count: u32) -> Self {
        Self {
            id: id.into(),
            consumer_count,
            filter: None,
        }
    }

    pub fn with_filter(id: impl Into<String>, consumer_count: u32, filter: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            consumer_count,
            filter: Some(filter.into()),
        }
    }

    /// Whether this group considers `message` at all.
    pub fn matches(&self, message: &Message) -> bool {
        match &self.filter {
            None => true,
            Some(filter) => {
                message.key.contains(filter.as_str())
                    || message.fields.values().any(|v| v.contains(filter.as_str()))
            }
        }
    }

    /// Processing-rate multiplier for this group. Exactly one applies:
    /// filtered groups process faster (less data) and take priority, then
    /// analytics-style groups run slower and billing-style groups faster.
    pub fn rate_multiplier(&self) -> f64 {
        if self.filter.is_some() {
            1.5
        } else if self.id.contains("analytics") {
            0.8
        } else if self.id.contains("billing") {
            1.2
        } else {
            1.0
        }
    }
}

/// Mutable consumption state of one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupState {
    spec: GroupSpec,
    /// Committed offset counter per partition; never regresses.
    offsets: HashMap<u32, u64>,
    /// Processed global sequence numbers per partition (at-most-once table).
    processed: HashMap<u32, HashSet<u64>>,
}

impl GroupState {
    pub fn new(spec: GroupSpec) -> Self {
        Self {
            spec,
            offsets: HashMap::new(),
            processed: HashMap::new(),
        }
    }

    pub fn spec(&self) -> &GroupSpec {
        &self.spec
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    /// Replace the group's spec, keeping offsets and the processed table.
    pub fn update_spec(&mut self, spec: GroupSpec) {
        self.spec = spec;
    }

    /// Committed offset counter for `partition`.
    pub fn committed_offset(&self, partition: u32) -> u64 {
        self.offsets.get(&partition).copied().unwrap_or(0)
    }

    /// Sum of committed offsets across partitions.
    pub fn total_committed(&self) -> u64 {
        self.offsets.values().sum()
    }

    pub fn is_processed(&self, partition: u32, global_seq: u64) -> bool {
        self.processed
            .get(&partition)
            .is_some_and(|set| set.contains(&global_seq))
    }

    /// Whether this group still needs `message` retained (eligible by
    /// filter and not yet processed) for offset advancement and lag.
    pub fn needs(&self, message: &Message) -> bool {
        self.spec.matches(message) && !self.is_processed(message.partition, message.global_seq)
    }

    /// One processing step over the partitions this group owns.
    ///
    /// For every assigned partition: collect eligible unprocessed messages,
    /// order them by production time, and process the prefix of length
    /// `floor(eligible * base_rate * multiplier)`. Partitions without an
    /// assigned consumer are skipped silently. Returns processed counts per
    /// partition.
    pub fn process_tick(
        &mut self,
        log: &mut MessageLog,
        assignment: &Assignment,
        base_rate: f64,
        now_ms: u64,
    ) -> HashMap<u32, usize> {
        let rate = (base_rate * self.spec.rate_multiplier()).clamp(0.0, 1.0);
        let mut per_partition = HashMap::new();

        for partition in 0..assignment.partition_count() {
            if assignment.consumer_for(partition).is_none() {
                continue;
            }

            let mut eligible: Vec<(u64, u64)> = log
                .messages(partition)
                .filter(|m| self.needs(m))
                .map(|m| (m.produced_at, m.global_seq))
                .collect();
            eligible.sort_unstable();

            let take = (eligible.len() as f64 * rate).floor() as usize;
            if take == 0 {
                continue;
            }

            for &(_, global_seq) in eligible.iter().take(take) {
                self.mark_processed(partition, global_seq);
                if let Some(message) = log.get_mut(global_seq) {
                    message.first_processed_at.get_or_insert(now_ms);
                }
            }
            trace!(
                group = %self.spec.id,
                partition,
                processed = take,
                "processed message prefix"
            );
            per_partition.insert(partition, take);
        }
        per_partition
    }

    fn mark_processed(&mut self, partition: u32, global_seq: u64) {
        let newly = self
            .processed
            .entry(partition)
            .or_default()
            .insert(global_seq);
        debug_assert!(newly, "message processed twice for the same group");
        if newly {
            *self.offsets.entry(partition).or_insert(0) += 1;
        }
    }

    /// Drop processed-table entries for messages no longer retained by the
    /// log. Offsets are untouched; commits never regress.
    pub fn prune_processed(&mut self, live: &HashSet<u64>) {
        for set in self.processed.values_mut() {
            set.retain(|seq| live.contains(seq));
        }
        self.processed.retain(|_, set| !set.is_empty());
    }
}
