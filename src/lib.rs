#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

//! # Topicsim
//!
//! Topicsim is a single-process, in-memory simulation core for the
//! coordination semantics of a partitioned publish/consume log:
//!
//! - **Deterministic routing**: messages are routed to partitions by
//!   resolving a key template against their fields and hashing the result
//! - **Independent consumer groups**: each group tracks its own committed
//!   offsets per partition and may carry a content filter
//! - **Rebalancing**: partition ownership is recomputed under range,
//!   round-robin, or sticky strategies whenever membership or strategy
//!   changes, through an explicit two-phase state machine
//! - **Derived metrics**: per-partition lag (count and age) and windowed
//!   throughput are pure read-side projections
//!
//! Rendering, input handling, network transport, and persistence are all out
//! of scope; an embedding display layer drives the core through
//! [`Simulator`] (or the thread-safe [`SharedSimulator`]) and reads its
//! derived state.
//!
//! ## Quick Start
//!
//! ```
//! use topicsim::{GroupSpec, SimConfig, Simulator};
//! use std::collections::BTreeMap;
//!
//! let mut sim = Simulator::new(
//!     SimConfig::default(),
//!     vec![
//!         GroupSpec::new("analytics-service", 2),
//!         GroupSpec::with_filter("account-001-processor", 1, "acc_001"),
//!     ],
//! )
//! .unwrap();
//!
//! let mut fields = BTreeMap::new();
//! fields.insert("account_id".to_string(), "acc_001".to_string());
//! let message = sim.produce(fields);
//! assert!(message.partition < sim.config().partition_count);
//!
//! // One processing step for every group; caller controls the cadence.
//! sim.tick();
//! ```
//!
//! ## Time
//!
//! Wall-clock timestamps come from a pluggable [`Clock`]; the rebalance
//! settling delays are logical tick counts, so the whole state machine can
//! be exercised in tests without real waits.

pub mod clock;
pub mod config;
pub mod consumer;
pub mod error;
pub mod log;
pub mod metrics;
pub mod router;
pub mod sim;
pub mod workload;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SimConfig;
pub use consumer::coordinator::{RebalanceCoordinator, RebalancePhase, RebalanceState};
pub use consumer::group::{GroupSpec, GroupState};
pub use consumer::lag::{GroupLag, PartitionLag};
pub use consumer::rebalance::{
    Assignment, PartitionAssignor, RangeAssignor, RoundRobinAssignor, StickyAssignor, Strategy,
};
pub use error::{Result, SimError};
pub use log::{Message, MessageLog};
pub use metrics::{RatePoint, RateWindow, ThroughputTotals, ThroughputTracker};
pub use sim::{SharedSimulator, SimSnapshot, Simulator};
pub use workload::FieldCatalog;
