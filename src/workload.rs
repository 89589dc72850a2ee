//! Random message workload.
//!
//! A [`FieldCatalog`] holds a pool of realistic values per field name and
//! samples one full field map per produced message. The default catalog
//! mirrors a small event stream keyed by account.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value pools used to generate message fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCatalog {
    pools: BTreeMap<String, Vec<String>>,
}

impl Default for FieldCatalog {
    fn default() -> Self {
        let mut pools = BTreeMap::new();
        pools.insert(
            "account_id".to_string(),
            strings(&["acc_001", "acc_002", "acc_003", "acc_004"]),
        );
        pools.insert(
            "record_id".to_string(),
            strings(&["rec_101", "rec_102", "rec_103", "rec_104", "rec_105"]),
        );
        pools.insert(
            "user_id".to_string(),
            strings(&["user_123", "user_456", "user_789"]),
        );
        pools.insert(
            "region".to_string(),
            strings(&["us-east", "us-west", "eu-west"]),
        );
        pools.insert(
            "event_type".to_string(),
            strings(&["login", "purchase", "view", "logout"]),
        );
        Self { pools }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl FieldCatalog {
    pub fn new(pools: BTreeMap<String, Vec<String>>) -> Self {
        Self { pools }
    }

    /// Replace or add one field's value pool.
    pub fn set_pool(&mut self, field: impl Into<String>, values: Vec<String>) {
        self.pools.insert(field.into(), values);
    }

    /// Field names in the catalog.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.pools.keys().map(String::as_str)
    }

    /// Value pool for one field.
    pub fn pool(&self, field: &str) -> Option<&[String]> {
        self.pools.get(field).map(Vec::as_slice)
    }

    /// Sample a full field map, drawing one value per field.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> BTreeMap<String, String> {
        self.pools
            .iter()
            .filter_map(|(field, values)| {
                values
                    .choose(rng)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect()
    }
}
