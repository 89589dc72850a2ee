//! Bounded time-series for throughput rates.
//!
//! A [`RateWindow`] is a ring buffer of timestamped counts. Each series
//! retains a fixed number of trailing points; the windowed rate is the sum
//! of counts inside the window divided by the window length.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A single recorded data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePoint {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Events recorded at that time.
    pub count: u64,
}

/// Ring buffer of timestamped counts with a windowed-rate accessor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateWindow {
    max_points: usize,
    points: VecDeque<RatePoint>,
}

impl RateWindow {
    pub fn new(max_points: usize) -> Self {
        Self {
            max_points: max_points.max(1),
            points: VecDeque::with_capacity(max_points.max(1)),
        }
    }

    /// Record a data point, evicting the oldest beyond capacity.
    pub fn record(&mut self, timestamp_ms: u64, count: u64) {
        while self.points.len() >= self.max_points {
            self.points.pop_front();
        }
        self.points.push_back(RatePoint {
            timestamp_ms,
            count,
        });
    }

    /// Events per second over the trailing `window_secs` seconds.
    pub fn rate(&self, now_ms: u64, window_secs: u64) -> f64 {
        if window_secs == 0 {
            return 0.0;
        }
        let cutoff = now_ms.saturating_sub(window_secs * 1_000);
        let total: u64 = self
            .points
            .iter()
            .filter(|p| p.timestamp_ms > cutoff)
            .map(|p| p.count)
            .sum();
        total as f64 / window_secs as f64
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }
}
