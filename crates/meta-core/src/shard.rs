//! Shard schemes and per-shard replica assignment
//!
//! A table's primary-key space is partitioned by an ordered list of split
//! points; each resulting shard is assigned a set of replica servers, one of
//! which is the director.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::ServerId;

/// Size of the key-prefix space used for uniform split points
pub const KEY_SPACE: u32 = 1 << 16;

/// Shard scheme / replica config errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShardError {
    #[error("Split points are not strictly increasing at index {0}")]
    UnorderedSplitPoints(usize),
    #[error("Shard count mismatch: scheme has {scheme} shards, config has {config}")]
    ShardCountMismatch { scheme: usize, config: usize },
    #[error("Shard {0} has no replicas")]
    NoReplicas(usize),
    #[error("Director of shard {0} is not one of its replicas")]
    DirectorNotReplica(usize),
}

/// Ordered split points partitioning the primary-key space
///
/// `n` split points describe `n + 1` shards: shard `i` covers keys in
/// `[split_points[i - 1], split_points[i])`, open-ended at both extremes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardScheme {
    pub split_points: Vec<String>,
}

impl ShardScheme {
    /// Scheme with a single shard covering every key
    pub fn one_shard() -> Self {
        Self {
            split_points: Vec::new(),
        }
    }

    /// Divide the key-prefix space into `num_shards` near-equal ranges
    ///
    /// The last shard takes the remainder of the space.
    pub fn uniform(num_shards: usize) -> Self {
        let num_shards = num_shards.clamp(1, KEY_SPACE as usize) as u32;
        let per_shard = KEY_SPACE / num_shards;
        let split_points = (1..num_shards)
            .map(|i| format!("{:04x}", i * per_shard))
            .collect();
        Self { split_points }
    }

    pub fn num_shards(&self) -> usize {
        self.split_points.len() + 1
    }

    /// Index of the shard owning `key` (binary search over the split points)
    pub fn shard_for_key(&self, key: &str) -> usize {
        self.split_points.partition_point(|point| point.as_str() <= key)
    }

    pub fn validate(&self) -> Result<(), ShardError> {
        for (i, pair) in self.split_points.windows(2).enumerate() {
            if pair[0] >= pair[1] {
                return Err(ShardError::UnorderedSplitPoints(i + 1));
            }
        }
        Ok(())
    }
}

/// Replica assignment for one shard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    /// All replicas of the shard, director included
    pub replicas: BTreeSet<ServerId>,
    /// Primary replica
    pub director: Option<ServerId>,
}

impl ShardConfig {
    pub fn new(director: ServerId, replicas: impl IntoIterator<Item = ServerId>) -> Self {
        let mut replicas: BTreeSet<ServerId> = replicas.into_iter().collect();
        replicas.insert(director);
        Self {
            replicas,
            director: Some(director),
        }
    }

    /// Replicas other than the director
    pub fn secondaries(&self) -> impl Iterator<Item = &ServerId> {
        self.replicas
            .iter()
            .filter(move |id| Some(**id) != self.director)
    }
}

/// Replica assignment for every shard of a table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub shards: Vec<ShardConfig>,
}

impl TableConfig {
    /// Every server referenced by any shard
    pub fn servers(&self) -> BTreeSet<ServerId> {
        self.shards
            .iter()
            .flat_map(|shard| shard.replicas.iter().copied())
            .collect()
    }

    /// Check the config against the scheme it was generated for
    pub fn validate(&self, scheme: &ShardScheme) -> Result<(), ShardError> {
        if self.shards.len() != scheme.num_shards() {
            return Err(ShardError::ShardCountMismatch {
                scheme: scheme.num_shards(),
                config: self.shards.len(),
            });
        }
        for (i, shard) in self.shards.iter().enumerate() {
            if shard.replicas.is_empty() {
                return Err(ShardError::NoReplicas(i));
            }
            if let Some(director) = shard.director {
                if !shard.replicas.contains(&director) {
                    return Err(ShardError::DirectorNotReplica(i));
                }
            }
        }
        Ok(())
    }
}

/// Shard scheme plus replica config, replaced as a unit on reconfigure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationInfo {
    pub shard_scheme: ShardScheme,
    pub config: TableConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_one_shard_covers_everything() {
        let scheme = ShardScheme::one_shard();
        assert_eq!(scheme.num_shards(), 1);
        assert_eq!(scheme.shard_for_key(""), 0);
        assert_eq!(scheme.shard_for_key("zzzz"), 0);
    }

    #[test]
    fn test_uniform_split_points() {
        let scheme = ShardScheme::uniform(4);
        assert_eq!(scheme.split_points, vec!["4000", "8000", "c000"]);
        assert_eq!(scheme.num_shards(), 4);
        assert!(scheme.validate().is_ok());

        assert_eq!(scheme.shard_for_key("0000"), 0);
        assert_eq!(scheme.shard_for_key("3fff"), 0);
        assert_eq!(scheme.shard_for_key("4000"), 1);
        assert_eq!(scheme.shard_for_key("bfff"), 2);
        assert_eq!(scheme.shard_for_key("ffff"), 3);
    }

    #[test]
    fn test_uniform_remainder_goes_to_last_shard() {
        let scheme = ShardScheme::uniform(3);
        // 65536 / 3 = 21845 = 0x5555
        assert_eq!(scheme.split_points, vec!["5555", "aaaa"]);
    }

    #[test]
    fn test_validate_rejects_unordered() {
        let scheme = ShardScheme {
            split_points: vec!["b".to_string(), "a".to_string()],
        };
        assert_eq!(scheme.validate(), Err(ShardError::UnorderedSplitPoints(1)));
    }

    #[test]
    fn test_table_config_validate() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let scheme = ShardScheme::uniform(2);

        let config = TableConfig {
            shards: vec![ShardConfig::new(a, [b]), ShardConfig::new(b, [])],
        };
        assert!(config.validate(&scheme).is_ok());
        assert_eq!(config.servers().len(), 2);
        assert_eq!(config.shards[0].secondaries().collect::<Vec<_>>(), vec![&b]);

        let short = TableConfig {
            shards: vec![ShardConfig::new(a, [])],
        };
        assert_eq!(
            short.validate(&scheme),
            Err(ShardError::ShardCountMismatch { scheme: 2, config: 1 })
        );
    }
}
