//! Rebalance coordination across consumer groups.
//!
//! The coordinator drives the transition between a stable assignment and a
//! new one whenever group membership, a group's consumer count, the
//! strategy, or the partition count changes:
//!
//! ```text
//! Stable ──trigger──▶ Rebalancing(Settling) ──ticks──▶ publish assignments
//!                              ▲                              │
//!                              └──── new trigger supersedes   ▼
//! Stable ◀──ticks── Rebalancing(Publishing)
//! ```
//!
//! Delays are logical tick counts, not timers: the embedding `tick()` loop
//! advances the machine, so the whole transition is testable without real
//! waits. While rebalancing, processing for every group is frozen. A
//! trigger landing mid-rebalance supersedes the in-flight transition — the
//! countdown restarts from a fresh snapshot and the superseded transition
//! never publishes.

use crate::consumer::group::GroupSpec;
use crate::consumer::rebalance::{Assignment, Strategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Phase of an in-flight rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalancePhase {
    /// Waiting out the settling delay before computing new assignments.
    Settling { remaining_ticks: u32 },
    /// New assignments published; waiting before resuming processing.
    Publishing { remaining_ticks: u32 },
}

/// Coordinator state. The terminal state between transitions is always
/// `Stable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceState {
    Stable,
    Rebalancing {
        phase: RebalancePhase,
        started_at_ms: u64,
    },
}

impl RebalanceState {
    pub fn is_stable(&self) -> bool {
        matches!(self, RebalanceState::Stable)
    }

    pub fn is_rebalancing(&self) -> bool {
        !self.is_stable()
    }
}

/// State machine owning per-group assignments and the rebalance lifecycle.
#[derive(Debug, Clone)]
pub struct RebalanceCoordinator {
    strategy: Strategy,
    settle_ticks: u32,
    publish_ticks: u32,
    state: RebalanceState,
    /// Live assignments, keyed by group id. Replaced wholesale on publish.
    assignments: HashMap<String, Assignment>,
    /// Snapshot taken at the latest trigger; input to the next computation.
    previous: HashMap<String, Assignment>,
    /// Incremented on every publish.
    generation: u64,
}

impl RebalanceCoordinator {
    pub fn new(strategy: Strategy, settle_ticks: u32, publish_ticks: u32) -> Self {
        Self {
            strategy,
            settle_ticks,
            publish_ticks,
            state: RebalanceState::Stable,
            assignments: HashMap::new(),
            previous: HashMap::new(),
            generation: 0,
        }
    }

    /// Compute initial assignments without a transition; the coordinator
    /// starts out `Stable`.
    pub fn bootstrap(&mut self, partition_count: u32, groups: &[GroupSpec]) {
        let assignor = self.strategy.assignor();
        self.assignments = groups
            .iter()
            .map(|g| {
                (
                    g.id.clone(),
                    assignor.assign(partition_count, g.consumer_count, &Assignment::empty()),
                )
            })
            .collect();
        self.generation = 1;
        debug!(groups = groups.len(), partition_count, "bootstrapped assignments");
    }

    pub fn state(&self) -> &RebalanceState {
        &self.state
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Live assignment for a group; `None` for groups that have not been
    /// through a publish yet.
    pub fn assignment(&self, group_id: &str) -> Option<&Assignment> {
        self.assignments.get(group_id)
    }

    /// Assignment snapshotted at the latest trigger.
    pub fn previous_assignment(&self, group_id: &str) -> Option<&Assignment> {
        self.previous.get(group_id)
    }

    pub fn assignments(&self) -> &HashMap<String, Assignment> {
        &self.assignments
    }

    /// Forget a removed group's assignment state.
    pub fn remove_group(&mut self, group_id: &str) {
        self.assignments.remove(group_id);
        self.previous.remove(group_id);
    }

    /// Enter (or restart) a rebalance. Snapshots the live assignments as
    /// the previous mapping; any in-flight transition is superseded.
    pub fn trigger(&mut self, now_ms: u64) {
        let superseded = self.state.is_rebalancing();
        self.previous = self.assignments.clone();
        self.state = RebalanceState::Rebalancing {
            phase: RebalancePhase::Settling {
                remaining_ticks: self.settle_ticks,
            },
            started_at_ms: now_ms,
        };
        info!(superseded, settle_ticks = self.settle_ticks, "rebalance triggered");
    }

    /// Advance the state machine by one logical tick. Returns `true` when
    /// new assignments were published this tick.
    pub fn advance(&mut self, partition_count: u32, groups: &[GroupSpec]) -> bool {
        let (phase, started_at_ms) = match self.state {
            RebalanceState::Stable => return false,
            RebalanceState::Rebalancing {
                phase,
                started_at_ms,
            } => (phase, started_at_ms),
        };

        match phase {
            RebalancePhase::Settling { remaining_ticks } => {
                if remaining_ticks > 1 {
                    self.state = RebalanceState::Rebalancing {
                        phase: RebalancePhase::Settling {
                            remaining_ticks: remaining_ticks - 1,
                        },
                        started_at_ms,
                    };
                    return false;
                }
                self.publish(partition_count, groups);
                if self.publish_ticks == 0 {
                    self.state = RebalanceState::Stable;
                    info!(generation = self.generation, "rebalance complete");
                } else {
                    self.state = RebalanceState::Rebalancing {
                        phase: RebalancePhase::Publishing {
                            remaining_ticks: self.publish_ticks,
                        },
                        started_at_ms,
                    };
                }
                true
            }
            RebalancePhase::Publishing { remaining_ticks } => {
                if remaining_ticks > 1 {
                    self.state = RebalanceState::Rebalancing {
                        phase: RebalancePhase::Publishing {
                            remaining_ticks: remaining_ticks - 1,
                        },
                        started_at_ms,
                    };
                } else {
                    self.state = RebalanceState::Stable;
                    info!(generation = self.generation, "rebalance complete");
                }
                false
            }
        }
    }

    /// Compute and publish a fresh assignment for every group
    /// independently, each against its own previous mapping.
    fn publish(&mut self, partition_count: u32, groups: &[GroupSpec]) {
        let assignor = self.strategy.assignor();
        let mut fresh = HashMap::with_capacity(groups.len());
        for group in groups {
            let previous = self
                .previous
                .get(&group.id)
                .cloned()
                .unwrap_or_else(Assignment::empty);
            let assignment = assignor.assign(partition_count, group.consumer_count, &previous);
            debug!(
                group = %group.id,
                strategy = %self.strategy,
                moved = assignment.moved_since(&previous),
                "published assignment"
            );
            fresh.insert(group.id.clone(), assignment);
        }
        self.assignments = fresh;
        self.generation += 1;
    }
}
