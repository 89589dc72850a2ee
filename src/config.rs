//! Simulation configuration.
//!
//! [`SimConfig`] carries every tunable of the coordination core. Defaults
//! mirror a small interactive topology: three partitions, an `account_id`
//! key template, and an 80% per-tick processing rate.

use crate::consumer::rebalance::Strategy;
use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};

/// Default number of partitions.
pub const DEFAULT_PARTITION_COUNT: u32 = 3;

/// Default partition key template.
pub const DEFAULT_KEY_TEMPLATE: &str = "account_id";

/// Default fraction of eligible messages a group processes per tick.
pub const DEFAULT_PROCESSING_RATE: f64 = 0.8;

/// Upper bound on the configurable processing rate.
pub const MAX_PROCESSING_RATE: f64 = 1.5;

/// Default retention horizon for produced messages.
pub const DEFAULT_RETENTION_MS: u64 = 10_000;

/// Default cap on retained messages across all partitions.
pub const DEFAULT_MAX_RETAINED: usize = 100;

/// Default number of ticks spent settling before new assignments are
/// computed during a rebalance.
pub const DEFAULT_SETTLE_TICKS: u32 = 2;

/// Default number of ticks between publishing new assignments and resuming
/// processing.
pub const DEFAULT_PUBLISH_TICKS: u32 = 1;

/// Default throughput window in seconds.
pub const DEFAULT_THROUGHPUT_WINDOW_SECS: u64 = 10;

/// Default number of data points each rate series retains.
pub const DEFAULT_HISTORY_POINTS: usize = 60;

/// Complete configuration for a [`crate::Simulator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of partitions in the simulated topic.
    pub partition_count: u32,

    /// Template resolved against message fields to derive the partition key.
    pub key_template: String,

    /// Initial partition assignment strategy.
    pub strategy: Strategy,

    /// Fraction of eligible messages processed per tick, before per-group
    /// multipliers. Clamped to `[0, MAX_PROCESSING_RATE]`.
    pub processing_rate: f64,

    /// Messages older than this horizon become eligible for eviction.
    pub retention_ms: u64,

    /// Hard cap on retained messages; the oldest are evicted beyond it.
    pub max_retained: usize,

    /// Rebalance settling delay, in logical ticks.
    pub settle_ticks: u32,

    /// Post-publish delay before returning to stable, in logical ticks.
    pub publish_ticks: u32,

    /// Window used by the throughput rate accessors, in seconds.
    pub throughput_window_secs: u64,

    /// Data points retained per throughput series.
    pub history_points: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            partition_count: DEFAULT_PARTITION_COUNT,
            key_template: DEFAULT_KEY_TEMPLATE.to_string(),
            strategy: Strategy::Range,
            processing_rate: DEFAULT_PROCESSING_RATE,
            retention_ms: DEFAULT_RETENTION_MS,
            max_retained: DEFAULT_MAX_RETAINED,
            settle_ticks: DEFAULT_SETTLE_TICKS,
            publish_ticks: DEFAULT_PUBLISH_TICKS,
            throughput_window_secs: DEFAULT_THROUGHPUT_WINDOW_SECS,
            history_points: DEFAULT_HISTORY_POINTS,
        }
    }
}

impl SimConfig {
    /// Validate the configuration, returning the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.partition_count == 0 {
            return Err(SimError::InvalidPartitionCount(self.partition_count));
        }
        if !(0.0..=MAX_PROCESSING_RATE).contains(&self.processing_rate) {
            return Err(SimError::Config(format!(
                "processing rate {} outside [0, {MAX_PROCESSING_RATE}]",
                self.processing_rate
            )));
        }
        if self.throughput_window_secs == 0 {
            return Err(SimError::Config(
                "throughput window must be at least one second".to_string(),
            ));
        }
        if self.history_points == 0 {
            return Err(SimError::Config(
                "history must retain at least one point".to_string(),
            ));
        }
        Ok(())
    }
}
