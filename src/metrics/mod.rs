//! Throughput tracking.
//!
//! The tracker keeps bounded rate series for messages produced, messages
//! consumed per group, and messages consumed per partition (attributed to
//! the reference group — the first configured one, matching what a display
//! layer charts), plus running totals. It is fed by the simulation tick and
//! read on demand; it never touches the log or group state.

mod history;

pub use history::{RatePoint, RateWindow};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Running totals since startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputTotals {
    /// Messages produced across all partitions.
    pub produced: u64,
    /// Messages consumed by the reference group.
    pub consumed: u64,
}

/// Windowed throughput series for the whole simulation.
#[derive(Debug, Clone)]
pub struct ThroughputTracker {
    history_points: usize,
    produced: RateWindow,
    consumed_by_group: HashMap<String, RateWindow>,
    consumed_by_partition: HashMap<u32, RateWindow>,
    totals: ThroughputTotals,
}

impl ThroughputTracker {
    pub fn new(history_points: usize) -> Self {
        Self {
            history_points,
            produced: RateWindow::new(history_points),
            consumed_by_group: HashMap::new(),
            consumed_by_partition: HashMap::new(),
            totals: ThroughputTotals::default(),
        }
    }

    /// Record produced messages at `now_ms`.
    pub fn record_produced(&mut self, now_ms: u64, count: u64) {
        self.produced.record(now_ms, count);
        self.totals.produced += count;
    }

    /// Record one group's consumed count for this tick.
    pub fn record_group_consumed(&mut self, group_id: &str, now_ms: u64, count: u64) {
        self.consumed_by_group
            .entry(group_id.to_string())
            .or_insert_with(|| RateWindow::new(self.history_points))
            .record(now_ms, count);
    }

    /// Record the reference group's per-partition consumed counts; feeds
    /// the per-partition series and the consumed total.
    pub fn record_reference_consumed(&mut self, now_ms: u64, per_partition: &HashMap<u32, usize>) {
        let mut total = 0u64;
        for (&partition, &count) in per_partition {
            total += count as u64;
            self.consumed_by_partition
                .entry(partition)
                .or_insert_with(|| RateWindow::new(self.history_points))
                .record(now_ms, count as u64);
        }
        self.totals.consumed += total;
    }

    /// Produced messages per second over the trailing window.
    pub fn produced_rate(&self, now_ms: u64, window_secs: u64) -> f64 {
        self.produced.rate(now_ms, window_secs)
    }

    /// One group's consumed messages per second over the trailing window.
    pub fn consumed_rate(&self, group_id: &str, now_ms: u64, window_secs: u64) -> f64 {
        self.consumed_by_group
            .get(group_id)
            .map_or(0.0, |w| w.rate(now_ms, window_secs))
    }

    /// Reference-group consumed rate for one partition.
    pub fn partition_rate(&self, partition: u32, now_ms: u64, window_secs: u64) -> f64 {
        self.consumed_by_partition
            .get(&partition)
            .map_or(0.0, |w| w.rate(now_ms, window_secs))
    }

    pub fn totals(&self) -> ThroughputTotals {
        self.totals
    }

    /// Drop a removed group's series; totals are kept.
    pub fn forget_group(&mut self, group_id: &str) {
        self.consumed_by_group.remove(group_id);
    }
}
