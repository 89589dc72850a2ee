//! Append-only in-memory message log.
//!
//! Messages are stored in production order, which is also global sequence
//! order. Per-partition offsets come from monotonic counters held by the
//! log itself, so eviction never renumbers the offsets of surviving
//! messages and an evicted partition keeps appending where it left off.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// A single produced message. Immutable once produced, except for the
/// first-processed timestamp which is set at most once by whichever group
/// processes it first (display metric only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Log-wide strictly increasing sequence number, starting at 1.
    pub global_seq: u64,
    /// Partition this message was routed to.
    pub partition: u32,
    /// Partition-local, zero-based, strictly increasing position.
    pub offset: u64,
    /// Resolved partition key.
    pub key: String,
    /// Field values the key was resolved from.
    pub fields: BTreeMap<String, String>,
    /// Production timestamp, epoch milliseconds.
    pub produced_at: u64,
    /// Set once, when the first group processes this message.
    pub first_processed_at: Option<u64>,
}

/// Append-only, bounded, per-partition ordered message store.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MessageLog {
    messages: Vec<Message>,
    next_seq: u64,
    next_offsets: BTreeMap<u32, u64>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to `partition`, assigning the next global sequence
    /// number and the partition's next offset.
    pub fn append(
        &mut self,
        partition: u32,
        key: String,
        fields: BTreeMap<String, String>,
        now_ms: u64,
    ) -> &Message {
        self.next_seq += 1;
        let offset = self.next_offsets.entry(partition).or_insert(0);
        let message = Message {
            global_seq: self.next_seq,
            partition,
            offset: *offset,
            key,
            fields,
            produced_at: now_ms,
            first_processed_at: None,
        };
        *offset += 1;
        trace!(
            global_seq = message.global_seq,
            partition,
            offset = message.offset,
            key = %message.key,
            "appended message"
        );
        let index = self.messages.len();
        self.messages.push(message);
        &self.messages[index]
    }

    /// Messages of one partition, in offset order.
    pub fn messages(&self, partition: u32) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.partition == partition)
    }

    /// All retained messages, in global sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    /// Mutable access to a retained message by global sequence number.
    pub fn get_mut(&mut self, global_seq: u64) -> Option<&mut Message> {
        let index = self
            .messages
            .binary_search_by_key(&global_seq, |m| m.global_seq)
            .ok()?;
        self.messages.get_mut(index)
    }

    /// Number of retained messages across all partitions.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of retained messages in one partition.
    pub fn partition_len(&self, partition: u32) -> usize {
        self.messages(partition).count()
    }

    /// Offset the next message appended to `partition` will receive.
    pub fn next_offset(&self, partition: u32) -> u64 {
        self.next_offsets.get(&partition).copied().unwrap_or(0)
    }

    /// Drop messages outside the retention window.
    ///
    /// A message past the time horizon is removed only once `is_needed`
    /// says no reader still depends on it; the count bound is hard and
    /// drops the oldest messages unconditionally. Returns the number of
    /// evicted messages.
    pub fn evict<F>(
        &mut self,
        now_ms: u64,
        retention_ms: u64,
        max_retained: usize,
        mut is_needed: F,
    ) -> usize
    where
        F: FnMut(&Message) -> bool,
    {
        let before = self.messages.len();
        let horizon = now_ms.saturating_sub(retention_ms);
        self.messages
            .retain(|m| m.produced_at >= horizon || is_needed(m));
        if self.messages.len() > max_retained {
            let excess = self.messages.len() - max_retained;
            self.messages.drain(..excess);
        }
        before - self.messages.len()
    }
}
