//! Consumer group state, partition assignment, and rebalancing.

pub mod coordinator;
pub mod group;
pub mod lag;
pub mod rebalance;
