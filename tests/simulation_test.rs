//! End-to-end scenarios driving the full simulation loop: routing,
//! processing, lag, rebalancing, and eviction together.

use std::collections::BTreeMap;
use std::sync::Arc;
use topicsim::{
    GroupSpec, ManualClock, RebalanceState, SimConfig, Simulator, Strategy,
};
use tracing_subscriber::EnvFilter;

/// Initialize test logging
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("topicsim=debug".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

fn fields(account: &str) -> BTreeMap<String, String> {
    let mut f = BTreeMap::new();
    f.insert("account_id".to_string(), account.to_string());
    f
}

fn new_sim(config: SimConfig, groups: Vec<GroupSpec>) -> (Simulator, Arc<ManualClock>) {
    init_logging();
    let clock = Arc::new(ManualClock::new(1_000_000));
    let sim = Simulator::with_clock(config, groups, clock.clone()).expect("valid config");
    (sim, clock)
}

fn full_rate() -> SimConfig {
    SimConfig {
        processing_rate: 1.0,
        ..SimConfig::default()
    }
}

fn drive_to_stable(sim: &mut Simulator, clock: &ManualClock) {
    let mut ticks = 0;
    while sim.rebalance_state().is_rebalancing() {
        clock.advance(1_000);
        sim.tick();
        ticks += 1;
        assert!(ticks < 100, "simulation never stabilized");
    }
}

#[test]
fn test_same_key_always_routes_to_same_partition() {
    let (mut sim, _clock) = new_sim(SimConfig::default(), vec![GroupSpec::new("orders-service", 1)]);

    let first = sim.produce(fields("acc_003"));
    assert!(first.partition < 3);
    for _ in 0..10 {
        assert_eq!(sim.produce(fields("acc_003")).partition, first.partition);
    }
}

#[test]
fn test_offsets_and_sequence_are_monotonic() {
    let (mut sim, _clock) = new_sim(SimConfig::default(), vec![GroupSpec::new("orders-service", 1)]);

    let accounts = ["acc_001", "acc_002", "acc_003", "acc_004"];
    let mut last_seq = 0;
    for i in 0..20 {
        let message = sim.produce(fields(accounts[i % accounts.len()]));
        assert!(message.global_seq > last_seq, "global sequence regressed");
        last_seq = message.global_seq;
    }

    for partition in 0..3 {
        let messages = sim.messages(partition);
        for (expected, message) in messages.iter().enumerate() {
            assert_eq!(message.offset, expected as u64, "partition {partition}");
        }
    }
}

#[test]
fn test_tick_processes_oldest_prefix() {
    let (mut sim, clock) = new_sim(SimConfig::default(), vec![GroupSpec::new("orders-service", 1)]);

    // Five messages on one key land on one partition; rate 0.8 processes 4.
    for _ in 0..5 {
        sim.produce(fields("acc_001"));
    }
    clock.advance(1_000);
    sim.tick();

    let group = sim.group("orders-service").unwrap();
    assert_eq!(group.total_committed(), 4);
    assert_eq!(sim.totals().consumed, 4);
}

#[test]
fn test_messages_are_never_processed_twice() {
    let (mut sim, clock) = new_sim(full_rate(), vec![GroupSpec::new("orders-service", 1)]);

    for _ in 0..6 {
        sim.produce(fields("acc_002"));
    }
    clock.advance(1_000);
    sim.tick();
    assert_eq!(sim.totals().consumed, 6);

    // Further ticks over the same retained messages change nothing.
    for _ in 0..3 {
        clock.advance(1_000);
        sim.tick();
    }
    assert_eq!(sim.totals().consumed, 6);
    assert_eq!(sim.group("orders-service").unwrap().total_committed(), 6);
}

#[test]
fn test_groups_consume_independently() {
    let (mut sim, clock) = new_sim(
        full_rate(),
        vec![
            GroupSpec::new("orders-service", 1),
            GroupSpec::new("audit-service", 1),
        ],
    );

    for _ in 0..4 {
        sim.produce(fields("acc_001"));
    }
    clock.advance(1_000);
    sim.tick();

    assert_eq!(sim.group("orders-service").unwrap().total_committed(), 4);
    assert_eq!(sim.group("audit-service").unwrap().total_committed(), 4);
    // Reference-group totals count the first group only.
    assert_eq!(sim.totals().consumed, 4);
}

#[test]
fn test_filtered_group_skips_ineligible_messages() {
    let (mut sim, clock) = new_sim(
        full_rate(),
        vec![
            GroupSpec::new("orders-service", 1),
            GroupSpec::with_filter("account-001-processor", 1, "acc_001"),
        ],
    );

    sim.produce(fields("acc_002"));
    sim.produce(fields("acc_001"));
    sim.produce(fields("acc_002"));
    clock.advance(1_000);
    sim.tick();

    let filtered = sim.group("account-001-processor").unwrap();
    assert_eq!(filtered.total_committed(), 1);
    assert_eq!(sim.group("orders-service").unwrap().total_committed(), 3);

    // The ineligible messages never show up as lag for the filtered group.
    let lag = sim.group_lag("account-001-processor").unwrap();
    assert_eq!(lag.total, 0);
}

#[test]
fn test_processing_freezes_during_rebalance() {
    let (mut sim, clock) = new_sim(full_rate(), vec![GroupSpec::new("orders-service", 1)]);

    for _ in 0..4 {
        sim.produce(fields("acc_001"));
    }
    sim.set_group_consumers("orders-service", 2);
    assert!(sim.rebalance_state().is_rebalancing());

    // Two settling ticks: nothing is consumed.
    clock.advance(1_000);
    sim.tick();
    assert_eq!(sim.totals().consumed, 0);
    clock.advance(1_000);
    sim.tick();
    assert_eq!(sim.totals().consumed, 0);
    assert!(sim.rebalance_state().is_rebalancing());

    // Publishing tick returns to stable and processing resumes.
    clock.advance(1_000);
    sim.tick();
    assert!(sim.rebalance_state().is_stable());
    assert_eq!(sim.totals().consumed, 4);
}

#[test]
fn test_supersede_restarts_the_countdown() {
    let (mut sim, clock) = new_sim(full_rate(), vec![GroupSpec::new("orders-service", 1)]);
    sim.produce(fields("acc_001"));

    sim.set_group_consumers("orders-service", 2);
    clock.advance(1_000);
    sim.tick();

    // Mid-settle change supersedes; the first transition never publishes.
    sim.set_group_consumers("orders-service", 3);
    clock.advance(1_000);
    sim.tick();
    clock.advance(1_000);
    sim.tick();
    assert!(sim.rebalance_state().is_rebalancing());

    clock.advance(1_000);
    sim.tick();
    assert!(sim.rebalance_state().is_stable());
    // Only the final configuration ever became live.
    let assignment = sim.assignment("orders-service").unwrap();
    assert_eq!(
        (0..3).filter_map(|p| assignment.consumer_for(p)).max(),
        Some(2)
    );
}

#[test]
fn test_sticky_rebalance_moves_minimally() {
    let config = SimConfig {
        strategy: Strategy::Sticky,
        partition_count: 6,
        processing_rate: 1.0,
        ..SimConfig::default()
    };
    let (mut sim, clock) = new_sim(config, vec![GroupSpec::new("orders-service", 2)]);

    let before = sim.assignment("orders-service").unwrap().clone();
    sim.set_group_consumers("orders-service", 3);
    drive_to_stable(&mut sim, &clock);

    let after = sim.assignment("orders-service").unwrap();
    // 6 partitions over 3 consumers: every consumer owns exactly 2, and
    // only the partitions handed to the new consumer moved.
    for consumer in 0..3 {
        assert_eq!(after.partitions_of(consumer).len(), 2);
    }
    assert_eq!(after.moved_since(&before), 2);
}

#[test]
fn test_partition_count_change_lands_on_publish() {
    let (mut sim, clock) = new_sim(full_rate(), vec![GroupSpec::new("orders-service", 1)]);
    assert_eq!(sim.assignment("orders-service").unwrap().partition_count(), 3);

    sim.set_partition_count(5);
    // Old mapping stays live until the rebalance publishes.
    assert_eq!(sim.assignment("orders-service").unwrap().partition_count(), 3);
    drive_to_stable(&mut sim, &clock);
    assert_eq!(sim.assignment("orders-service").unwrap().partition_count(), 5);
}

#[test]
fn test_expired_processed_messages_are_evicted() {
    let (mut sim, clock) = new_sim(full_rate(), vec![GroupSpec::new("orders-service", 1)]);

    for _ in 0..3 {
        sim.produce(fields("acc_001"));
    }
    clock.advance(1_000);
    sim.tick();
    assert_eq!(sim.message_count(), 3);

    // Past the retention horizon with nothing left to process.
    clock.advance(11_000);
    sim.tick();
    assert_eq!(sim.message_count(), 0);

    // Offsets survive eviction and keep counting.
    let partition = sim.produce(fields("acc_001")).partition;
    let messages = sim.messages(partition);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].offset, 3);
    assert_eq!(sim.group("orders-service").unwrap().total_committed(), 3);
}

#[test]
fn test_unprocessed_messages_survive_the_horizon() {
    let (mut sim, clock) = new_sim(SimConfig::default(), vec![GroupSpec::new("orders-service", 1)]);
    sim.set_processing_rate(0.0);

    sim.produce(fields("acc_001"));
    clock.advance(60_000);
    sim.tick();

    // Still needed by the group, so retention does not drop it.
    assert_eq!(sim.message_count(), 1);

    // Once processed, the next tick past the horizon lets it go.
    sim.set_processing_rate(1.0);
    sim.tick();
    clock.advance(11_000);
    sim.tick();
    assert_eq!(sim.message_count(), 0);
}

#[test]
fn test_retained_count_is_hard_bounded() {
    let config = SimConfig {
        max_retained: 10,
        ..SimConfig::default()
    };
    let (mut sim, clock) = new_sim(config, vec![GroupSpec::new("orders-service", 1)]);
    sim.set_processing_rate(0.0);

    for i in 0..25 {
        sim.produce(fields(["acc_001", "acc_002", "acc_003"][i % 3]));
    }
    clock.advance(100);
    sim.tick();

    // The cap wins even over unprocessed messages.
    assert_eq!(sim.message_count(), 10);
    let oldest = (0..3)
        .flat_map(|p| sim.messages(p))
        .map(|m| m.global_seq)
        .min()
        .unwrap();
    assert_eq!(oldest, 16, "eviction must drop the oldest first");
}

#[test]
fn test_group_lifecycle_add_and_remove() {
    let (mut sim, clock) = new_sim(full_rate(), vec![GroupSpec::new("orders-service", 1)]);
    sim.produce(fields("acc_001"));

    sim.add_group(GroupSpec::new("billing-service", 2));
    assert!(sim.rebalance_state().is_rebalancing());
    drive_to_stable(&mut sim, &clock);

    assert!(sim.assignment("billing-service").is_some());
    assert!(sim.group("billing-service").unwrap().total_committed() > 0);

    sim.remove_group("billing-service");
    drive_to_stable(&mut sim, &clock);
    assert!(sim.group("billing-service").is_none());
    assert!(sim.assignment("billing-service").is_none());
    assert_eq!(sim.consumed_rate("billing-service"), 0.0);
}

#[test]
fn test_configure_groups_preserves_surviving_offsets() {
    let (mut sim, clock) = new_sim(
        full_rate(),
        vec![
            GroupSpec::new("orders-service", 1),
            GroupSpec::new("audit-service", 1),
        ],
    );
    sim.produce(fields("acc_001"));
    clock.advance(1_000);
    sim.tick();
    assert_eq!(sim.group("orders-service").unwrap().total_committed(), 1);

    sim.configure_groups(vec![
        GroupSpec::new("orders-service", 2),
        GroupSpec::new("billing-service", 1),
    ]);
    drive_to_stable(&mut sim, &clock);

    // The surviving group keeps its commits; the dropped one is gone.
    assert_eq!(sim.group("orders-service").unwrap().total_committed(), 1);
    assert!(sim.group("audit-service").is_none());
    assert!(sim.group("billing-service").is_some());
}

#[test]
fn test_rebalance_state_reports_generation_progress() {
    let (mut sim, clock) = new_sim(full_rate(), vec![GroupSpec::new("orders-service", 1)]);
    let before = sim.snapshot().generation;

    sim.set_strategy("roundrobin");
    assert!(matches!(sim.rebalance_state(), RebalanceState::Rebalancing { .. }));
    drive_to_stable(&mut sim, &clock);

    let snapshot = sim.snapshot();
    assert_eq!(snapshot.generation, before + 1);
    assert_eq!(snapshot.strategy, Strategy::RoundRobin);
    assert!(snapshot.state.is_stable());
}

#[test]
fn test_throughput_rates_track_the_window() {
    let (mut sim, clock) = new_sim(full_rate(), vec![GroupSpec::new("orders-service", 1)]);

    for _ in 0..10 {
        clock.advance(1_000);
        sim.produce(fields("acc_001"));
        sim.tick();
    }
    // 10 messages over the 10-second window, produced and consumed.
    assert!((sim.produced_rate() - 1.0).abs() < f64::EPSILON);
    assert!((sim.consumed_rate("orders-service") - 1.0).abs() < f64::EPSILON);

    // A quiet stretch drains the window back to zero.
    clock.advance(30_000);
    assert_eq!(sim.produced_rate(), 0.0);
    assert_eq!(sim.consumed_rate("orders-service"), 0.0);
}

#[test]
fn test_generated_workload_is_routable() {
    let (mut sim, clock) = new_sim(full_rate(), vec![GroupSpec::new("orders-service", 1)]);
    sim.seed_workload(7);

    for _ in 0..20 {
        let message = sim.produce_generated();
        assert!(message.partition < 3);
        assert!(message.fields.contains_key("account_id"));
        assert_eq!(message.key, message.fields["account_id"]);
    }
    clock.advance(1_000);
    sim.tick();
    assert_eq!(sim.totals().produced, 20);
    assert_eq!(sim.totals().consumed, 20);
}

#[test]
fn test_key_template_change_affects_routing_only() {
    let (mut sim, _clock) = new_sim(SimConfig::default(), vec![GroupSpec::new("orders-service", 1)]);
    assert!(sim.rebalance_state().is_stable());

    sim.set_key_template("region:event_type");
    assert!(sim.rebalance_state().is_stable());

    let mut f = fields("acc_001");
    f.insert("region".to_string(), "us-east".to_string());
    f.insert("event_type".to_string(), "login".to_string());
    let message = sim.produce(f);
    assert_eq!(message.key, "us-east:login");
}
