//! Scheduler module
//!
//! Replica placement for new and reconfigured tables:
//! - Shard boundary calculation (split points)
//! - Per-shard replica config generated by server tag

mod placement;
mod split;

pub use placement::{ConfigGenerator, TagPlacement};
pub use split::{SplitPointCalculator, UniformSplitPoints};

use std::collections::BTreeMap;

use meta_core::{ServerId, TableConfig};
use serde::{Deserialize, Serialize};

use crate::config::TableDefaults;

/// Replica parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaParams {
    /// Desired shard count
    pub num_shards: usize,
    /// Replica count per server tag
    pub num_replicas: BTreeMap<String, usize>,
    /// Tag the director of each shard is picked from
    pub director_tag: String,
}

impl ReplicaParams {
    /// One shard, `replicas` replicas on `tag`, directors from `tag`
    pub fn new(num_shards: usize, tag: impl Into<String>, replicas: usize) -> Self {
        let tag = tag.into();
        Self {
            num_shards,
            num_replicas: BTreeMap::from([(tag.clone(), replicas)]),
            director_tag: tag,
        }
    }

    pub fn from_defaults(defaults: &TableDefaults) -> Self {
        Self::new(1, defaults.server_tag.clone(), defaults.replicas)
    }

    pub fn total_replicas(&self) -> usize {
        self.num_replicas.values().sum()
    }
}

/// Server load: replica slots assigned to each server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerUsage {
    counts: BTreeMap<ServerId, usize>,
}

impl ServerUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count every replica of every shard in `config`
    pub fn add_config(&mut self, config: &TableConfig) {
        for shard in &config.shards {
            for server in &shard.replicas {
                self.add(*server, 1);
            }
        }
    }

    pub fn add(&mut self, server: ServerId, count: usize) {
        *self.counts.entry(server).or_insert(0) += count;
    }

    pub fn get(&self, server: &ServerId) -> usize {
        self.counts.get(server).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ServerId, &usize)> {
        self.counts.iter()
    }
}
