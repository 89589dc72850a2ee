//! Simulation facade.
//!
//! [`Simulator`] is the single owner of all mutable coordination state: the
//! message log, per-group offsets, assignments, and throughput series. All
//! mutations go through its methods, so produce, process, evict, and
//! rebalance steps never interleave partially. [`SharedSimulator`] wraps it
//! for concurrent producer/processing tickers.
//!
//! Within one [`Simulator::tick`]: the rebalance machine advances, groups
//! process (skipped entirely while rebalancing), throughput is recorded,
//! and only then does eviction run — so an in-flight lag or rate read in
//! the same tick never observes a message disappearing under it.

use crate::clock::{Clock, SystemClock};
use crate::config::{SimConfig, MAX_PROCESSING_RATE};
use crate::consumer::coordinator::{RebalanceCoordinator, RebalanceState};
use crate::consumer::group::{GroupSpec, GroupState};
use crate::consumer::lag::{self, GroupLag, PartitionLag};
use crate::consumer::rebalance::{Assignment, Strategy};
use crate::error::{Result, SimError};
use crate::log::{Message, MessageLog};
use crate::metrics::{ThroughputTotals, ThroughputTracker};
use crate::router;
use crate::workload::FieldCatalog;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Serializable read model of the whole simulation, for display layers.
#[derive(Debug, Clone, Serialize)]
pub struct SimSnapshot {
    pub state: RebalanceState,
    pub strategy: Strategy,
    pub generation: u64,
    pub partition_count: u32,
    pub assignments: HashMap<String, Assignment>,
    pub lags: Vec<GroupLag>,
    pub produced_rate: f64,
    pub consumed_rates: HashMap<String, f64>,
    pub totals: ThroughputTotals,
    pub retained_messages: usize,
}

/// The coordination core: deterministic routing, independent consumer
/// groups, rebalancing, and derived metrics, all in one in-memory owner.
pub struct Simulator {
    config: SimConfig,
    clock: Arc<dyn Clock>,
    log: MessageLog,
    /// Order matters: the first group is the reference group for the
    /// consumed totals and per-partition throughput series.
    groups: Vec<GroupState>,
    coordinator: RebalanceCoordinator,
    throughput: ThroughputTracker,
    catalog: FieldCatalog,
    rng: StdRng,
}

impl Simulator {
    /// Create a simulator with the system clock.
    pub fn new(config: SimConfig, groups: Vec<GroupSpec>) -> Result<Self> {
        Self::with_clock(config, groups, Arc::new(SystemClock))
    }

    /// Create a simulator with an explicit clock (tests use
    /// [`crate::ManualClock`]).
    pub fn with_clock(
        config: SimConfig,
        groups: Vec<GroupSpec>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        if groups.is_empty() {
            return Err(SimError::Config(
                "at least one consumer group is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for group in &groups {
            if group.consumer_count == 0 {
                return Err(SimError::InvalidConsumerCount {
                    group: group.id.clone(),
                    count: 0,
                });
            }
            if !seen.insert(group.id.clone()) {
                return Err(SimError::Config(format!(
                    "duplicate consumer group id: {}",
                    group.id
                )));
            }
        }

        let mut coordinator = RebalanceCoordinator::new(
            config.strategy,
            config.settle_ticks,
            config.publish_ticks,
        );
        coordinator.bootstrap(config.partition_count, &groups);

        let history_points = config.history_points;
        info!(
            partitions = config.partition_count,
            groups = groups.len(),
            strategy = %config.strategy,
            "simulator initialized"
        );
        Ok(Self {
            config,
            clock,
            log: MessageLog::new(),
            groups: groups.into_iter().map(GroupState::new).collect(),
            coordinator,
            throughput: ThroughputTracker::new(history_points),
            catalog: FieldCatalog::default(),
            rng: StdRng::from_entropy(),
        })
    }

    // ---- producer side ----------------------------------------------------

    /// Route a message by the configured key template and append it.
    pub fn produce(&mut self, fields: BTreeMap<String, String>) -> Message {
        let now = self.clock.now_ms();
        let (key, partition) =
            router::route(&fields, &self.config.key_template, self.config.partition_count);
        let message = self.log.append(partition, key, fields, now).clone();
        self.throughput.record_produced(now, 1);
        message
    }

    /// Produce a message with fields sampled from the workload catalog.
    pub fn produce_generated(&mut self) -> Message {
        let fields = self.catalog.sample(&mut self.rng);
        self.produce(fields)
    }

    /// Replace the workload catalog.
    pub fn set_catalog(&mut self, catalog: FieldCatalog) {
        self.catalog = catalog;
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Reseed the workload generator for reproducible runs.
    pub fn seed_workload(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    // ---- processing -------------------------------------------------------

    /// Advance the simulation by one step: rebalance machine, then group
    /// processing (frozen while rebalancing), then eviction.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();

        let specs: Vec<GroupSpec> = self.groups.iter().map(|g| g.spec().clone()).collect();
        let published = self
            .coordinator
            .advance(self.config.partition_count, &specs);
        if published {
            debug!(generation = self.coordinator.generation(), "assignments published");
        }

        if self.coordinator.state().is_stable() {
            for (index, group) in self.groups.iter_mut().enumerate() {
                let Some(assignment) = self.coordinator.assignment(group.id()) else {
                    continue;
                };
                let per_partition =
                    group.process_tick(&mut self.log, assignment, self.config.processing_rate, now);
                let consumed: usize = per_partition.values().sum();
                let id = group.id().to_string();
                self.throughput
                    .record_group_consumed(&id, now, consumed as u64);
                if index == 0 {
                    self.throughput.record_reference_consumed(now, &per_partition);
                }
            }
        } else {
            trace!("processing frozen during rebalance");
        }

        self.evict(now);
    }

    fn evict(&mut self, now_ms: u64) {
        let groups = &self.groups;
        let removed = self.log.evict(
            now_ms,
            self.config.retention_ms,
            self.config.max_retained,
            |message| groups.iter().any(|g| g.needs(message)),
        );
        if removed > 0 {
            let live: HashSet<u64> = self.log.iter().map(|m| m.global_seq).collect();
            for group in &mut self.groups {
                group.prune_processed(&live);
            }
            trace!(removed, retained = self.log.len(), "evicted expired messages");
        }
    }

    // ---- configuration ----------------------------------------------------

    /// Replace the full group configuration. An empty list is refused;
    /// surviving groups keep their offsets and processed state. Triggers a
    /// rebalance when membership or any consumer count changed.
    pub fn configure_groups(&mut self, specs: Vec<GroupSpec>) {
        if specs.is_empty() {
            warn!("refusing to configure an empty consumer group list");
            return;
        }
        if let Some(bad) = specs.iter().find(|g| g.consumer_count == 0) {
            warn!(group = %bad.id, "refusing group configuration with zero consumers");
            return;
        }

        let membership = |specs: &[GroupSpec]| -> Vec<(String, u32)> {
            let mut pairs: Vec<(String, u32)> = specs
                .iter()
                .map(|g| (g.id.clone(), g.consumer_count))
                .collect();
            pairs.sort();
            pairs
        };
        let before = membership(&self.groups.iter().map(|g| g.spec().clone()).collect::<Vec<_>>());
        let after = membership(&specs);
        let changed = before != after;

        let mut old: HashMap<String, GroupState> = self
            .groups
            .drain(..)
            .map(|g| (g.id().to_string(), g))
            .collect();
        self.groups = specs
            .into_iter()
            .map(|spec| match old.remove(&spec.id) {
                Some(mut state) => {
                    state.update_spec(spec);
                    state
                }
                None => GroupState::new(spec),
            })
            .collect();
        for removed in old.keys() {
            self.coordinator.remove_group(removed);
            self.throughput.forget_group(removed);
        }

        if changed {
            info!("group configuration changed, rebalancing");
            self.coordinator.trigger(self.clock.now_ms());
        }
    }

    /// Add one group; a duplicate id is refused.
    pub fn add_group(&mut self, spec: GroupSpec) {
        if spec.consumer_count == 0 {
            warn!(group = %spec.id, "refusing group with zero consumers");
            return;
        }
        if self.groups.iter().any(|g| g.id() == spec.id) {
            warn!(group = %spec.id, "group already exists");
            return;
        }
        info!(group = %spec.id, consumers = spec.consumer_count, "group added");
        self.groups.push(GroupState::new(spec));
        self.coordinator.trigger(self.clock.now_ms());
    }

    /// Remove one group. The last remaining group is never removed.
    pub fn remove_group(&mut self, group_id: &str) {
        if self.groups.len() <= 1 {
            warn!(group = group_id, "refusing to remove the last consumer group");
            return;
        }
        let Some(index) = self.groups.iter().position(|g| g.id() == group_id) else {
            warn!(group = group_id, "cannot remove unknown group");
            return;
        };
        self.groups.remove(index);
        self.coordinator.remove_group(group_id);
        self.throughput.forget_group(group_id);
        info!(group = group_id, "group removed");
        self.coordinator.trigger(self.clock.now_ms());
    }

    /// Change one group's consumer count; zero is refused.
    pub fn set_group_consumers(&mut self, group_id: &str, consumer_count: u32) {
        if consumer_count == 0 {
            warn!(group = group_id, "refusing zero consumer count");
            return;
        }
        let Some(group) = self.groups.iter_mut().find(|g| g.id() == group_id) else {
            warn!(group = group_id, "cannot resize unknown group");
            return;
        };
        if group.spec().consumer_count == consumer_count {
            return;
        }
        let mut spec = group.spec().clone();
        spec.consumer_count = consumer_count;
        group.update_spec(spec);
        info!(group = group_id, consumers = consumer_count, "consumer count changed");
        self.coordinator.trigger(self.clock.now_ms());
    }

    /// Change one group's content filter. Filters affect eligibility, not
    /// partition ownership, so no rebalance is triggered.
    pub fn set_group_filter(&mut self, group_id: &str, filter: Option<String>) {
        let Some(group) = self.groups.iter_mut().find(|g| g.id() == group_id) else {
            warn!(group = group_id, "cannot set filter on unknown group");
            return;
        };
        let mut spec = group.spec().clone();
        spec.filter = filter.filter(|f| !f.is_empty());
        group.update_spec(spec);
    }

    /// Switch the rebalance strategy by name; unknown names fall back to
    /// round-robin. A no-op when the strategy is unchanged.
    pub fn set_strategy(&mut self, name: &str) {
        let strategy = Strategy::from_name(name);
        if strategy == self.coordinator.strategy() {
            return;
        }
        info!(strategy = %strategy, "rebalance strategy changed");
        self.coordinator.set_strategy(strategy);
        self.coordinator.trigger(self.clock.now_ms());
    }

    /// Change the partition count; zero is refused. Existing messages keep
    /// their partition and offsets; new assignments land on publish.
    pub fn set_partition_count(&mut self, partition_count: u32) {
        if partition_count == 0 {
            warn!("refusing zero partition count");
            return;
        }
        if partition_count == self.config.partition_count {
            return;
        }
        info!(partitions = partition_count, "partition count changed");
        self.config.partition_count = partition_count;
        self.coordinator.trigger(self.clock.now_ms());
    }

    /// Change the partition key template; affects routing only.
    pub fn set_key_template(&mut self, template: &str) {
        self.config.key_template = template.to_string();
    }

    /// Change the base processing rate, clamped to the supported range.
    pub fn set_processing_rate(&mut self, rate: f64) {
        self.config.processing_rate = rate.clamp(0.0, MAX_PROCESSING_RATE);
    }

    // ---- read side --------------------------------------------------------

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn strategy(&self) -> Strategy {
        self.coordinator.strategy()
    }

    pub fn rebalance_state(&self) -> RebalanceState {
        *self.coordinator.state()
    }

    /// Live assignment for a group.
    pub fn assignment(&self, group_id: &str) -> Option<&Assignment> {
        self.coordinator.assignment(group_id)
    }

    pub fn group(&self, group_id: &str) -> Option<&GroupState> {
        self.groups.iter().find(|g| g.id() == group_id)
    }

    pub fn group_ids(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.id().to_string()).collect()
    }

    /// Lag of one group behind one partition.
    pub fn lag(&self, group_id: &str, partition: u32) -> Option<PartitionLag> {
        let group = self.group(group_id)?;
        Some(lag::partition_lag(
            &self.log,
            group,
            partition,
            self.clock.now_ms(),
        ))
    }

    /// Lag rollup for one group across all partitions.
    pub fn group_lag(&self, group_id: &str) -> Option<GroupLag> {
        let group = self.group(group_id)?;
        Some(lag::group_lag(
            &self.log,
            group,
            self.config.partition_count,
            self.clock.now_ms(),
        ))
    }

    /// Lag of one consumer's share of a group, per the live assignment.
    pub fn consumer_lag(&self, group_id: &str, consumer: u32) -> Option<GroupLag> {
        let group = self.group(group_id)?;
        let assignment = self.coordinator.assignment(group_id)?;
        Some(lag::consumer_lag(
            &self.log,
            group,
            assignment,
            consumer,
            self.clock.now_ms(),
        ))
    }

    /// Produced messages/sec over the configured window.
    pub fn produced_rate(&self) -> f64 {
        self.throughput
            .produced_rate(self.clock.now_ms(), self.config.throughput_window_secs)
    }

    /// One group's consumed messages/sec over the configured window.
    pub fn consumed_rate(&self, group_id: &str) -> f64 {
        self.throughput.consumed_rate(
            group_id,
            self.clock.now_ms(),
            self.config.throughput_window_secs,
        )
    }

    /// Reference-group consumed messages/sec for one partition.
    pub fn partition_rate(&self, partition: u32) -> f64 {
        self.throughput.partition_rate(
            partition,
            self.clock.now_ms(),
            self.config.throughput_window_secs,
        )
    }

    pub fn totals(&self) -> ThroughputTotals {
        self.throughput.totals()
    }

    /// Retained messages of one partition, in offset order.
    pub fn messages(&self, partition: u32) -> Vec<Message> {
        self.log.messages(partition).cloned().collect()
    }

    pub fn message_count(&self) -> usize {
        self.log.len()
    }

    /// Full serializable read model for a display layer.
    pub fn snapshot(&self) -> SimSnapshot {
        let now = self.clock.now_ms();
        SimSnapshot {
            state: *self.coordinator.state(),
            strategy: self.coordinator.strategy(),
            generation: self.coordinator.generation(),
            partition_count: self.config.partition_count,
            assignments: self.coordinator.assignments().clone(),
            lags: self
                .groups
                .iter()
                .map(|g| lag::group_lag(&self.log, g, self.config.partition_count, now))
                .collect(),
            produced_rate: self.produced_rate(),
            consumed_rates: self
                .groups
                .iter()
                .map(|g| (g.id().to_string(), self.consumed_rate(g.id())))
                .collect(),
            totals: self.throughput.totals(),
            retained_messages: self.log.len(),
        }
    }
}

/// Thread-safe handle over a [`Simulator`] for concurrent producer and
/// processing tickers. All mutations serialize through one lock.
#[derive(Clone)]
pub struct SharedSimulator {
    inner: Arc<RwLock<Simulator>>,
}

impl SharedSimulator {
    pub fn new(simulator: Simulator) -> Self {
        Self {
            inner: Arc::new(RwLock::new(simulator)),
        }
    }

    pub fn produce(&self, fields: BTreeMap<String, String>) -> Message {
        self.inner.write().produce(fields)
    }

    pub fn produce_generated(&self) -> Message {
        self.inner.write().produce_generated()
    }

    pub fn tick(&self) {
        self.inner.write().tick();
    }

    /// Run a closure against the simulator's read side.
    pub fn read<R>(&self, f: impl FnOnce(&Simulator) -> R) -> R {
        f(&self.inner.read())
    }

    /// Run a closure with exclusive access, for configuration changes.
    pub fn with<R>(&self, f: impl FnOnce(&mut Simulator) -> R) -> R {
        f(&mut self.inner.write())
    }
}
