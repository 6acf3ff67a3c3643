//! Split point calculation
//!
//! Decides the shard boundaries of a table when its shard count changes.

use async_trait::async_trait;
use meta_core::{ShardScheme, TableId};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MetaError, MetaResult};
use crate::metadata::ClusterMetadata;

/// Proposes a shard scheme for a table
#[async_trait]
pub trait SplitPointCalculator: Send + Sync {
    async fn compute_shard_scheme(
        &self,
        table_id: TableId,
        metadata: &ClusterMetadata,
        num_shards: usize,
        previous: &ShardScheme,
        cancel: &CancellationToken,
    ) -> MetaResult<ShardScheme>;
}

/// Evenly spaced split points over the key-prefix space
///
/// Does not look at the data. A table keeps its boundaries while its shard
/// count stays the same.
#[derive(Debug, Clone)]
pub struct UniformSplitPoints {
    max_shards: usize,
}

impl UniformSplitPoints {
    pub fn new(max_shards: usize) -> Self {
        Self { max_shards }
    }
}

#[async_trait]
impl SplitPointCalculator for UniformSplitPoints {
    async fn compute_shard_scheme(
        &self,
        table_id: TableId,
        _metadata: &ClusterMetadata,
        num_shards: usize,
        previous: &ShardScheme,
        cancel: &CancellationToken,
    ) -> MetaResult<ShardScheme> {
        if cancel.is_cancelled() {
            return Err(MetaError::Cancelled);
        }
        if num_shards == 0 {
            return Err(MetaError::Configuration(
                "Every table must have at least one shard.".to_string(),
            ));
        }
        if num_shards > self.max_shards {
            return Err(MetaError::Configuration(format!(
                "Maximum number of shards is {}.",
                self.max_shards
            )));
        }

        if num_shards == previous.num_shards() {
            return Ok(previous.clone());
        }

        debug!(
            "Table {}: resharding {} -> {} shards",
            table_id,
            previous.num_shards(),
            num_shards
        );
        Ok(ShardScheme::uniform(num_shards))
    }
}
