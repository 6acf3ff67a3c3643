//! Replica placement by server tag

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use meta_core::{ServerId, ShardConfig, ShardScheme, TableConfig, TableId};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{ReplicaParams, ServerUsage};
use crate::directory::DirectoryMap;
use crate::error::{MetaError, MetaResult};
use crate::servers::ServerDirectory;

/// Produces the replica config of a table
#[async_trait]
pub trait ConfigGenerator: Send + Sync {
    /// Generate one `ShardConfig` per shard of `scheme`
    ///
    /// `table_id` and `directory` are given when reconfiguring an existing
    /// table, so servers that already host it can be preferred.
    async fn generate_config(
        &self,
        table_id: Option<TableId>,
        directory: Option<&DirectoryMap>,
        usage: &ServerUsage,
        params: &ReplicaParams,
        scheme: &ShardScheme,
        cancel: &CancellationToken,
    ) -> MetaResult<TableConfig>;
}

/// Places replicas on the least-used servers of each requested tag
pub struct TagPlacement {
    servers: Arc<ServerDirectory>,
}

impl TagPlacement {
    pub fn new(servers: Arc<ServerDirectory>) -> Self {
        Self { servers }
    }

    fn server_label(&self, id: &ServerId) -> String {
        self.servers
            .server_name(id)
            .unwrap_or_else(|| id.to_string())
    }

    /// Check the params and resolve each tag with replicas to its servers
    fn resolve_tags(
        &self,
        params: &ReplicaParams,
        scheme: &ShardScheme,
    ) -> MetaResult<BTreeMap<String, BTreeSet<ServerId>>> {
        if params.num_shards == 0 {
            return Err(config_error("Every table must have at least one shard."));
        }
        if params.num_shards != scheme.num_shards() {
            return Err(config_error(format!(
                "Shard scheme has {} shards but {} were requested.",
                scheme.num_shards(),
                params.num_shards
            )));
        }
        if params.total_replicas() == 0 {
            return Err(config_error("You must have at least one replica."));
        }
        if params.num_replicas.get(&params.director_tag).copied().unwrap_or(0) == 0 {
            return Err(config_error(format!(
                "Can't use server tag `{}` for directors because you specified no replicas \
                 in server tag `{}`.",
                params.director_tag, params.director_tag
            )));
        }

        let mut resolved: BTreeMap<String, BTreeSet<ServerId>> = BTreeMap::new();
        let mut owner: BTreeMap<ServerId, &str> = BTreeMap::new();
        for (tag, &count) in &params.num_replicas {
            if count == 0 {
                continue;
            }
            let candidates = self.servers.servers_with_tag(tag);
            if candidates.is_empty() {
                return Err(config_error(format!("No servers have server tag `{}`.", tag)));
            }
            for server in &candidates {
                if let Some(other) = owner.insert(*server, tag.as_str()) {
                    return Err(config_error(format!(
                        "Server `{}` has both tags `{}` and `{}`; a server can't be used \
                         for more than one tag in the same table.",
                        self.server_label(server),
                        other,
                        tag
                    )));
                }
            }
            if candidates.len() < count {
                return Err(config_error(format!(
                    "Can't put {} replicas on servers with the tag `{}` because there are \
                     only {} servers with that tag.",
                    count,
                    tag,
                    candidates.len()
                )));
            }
            resolved.insert(tag.clone(), candidates);
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ConfigGenerator for TagPlacement {
    async fn generate_config(
        &self,
        table_id: Option<TableId>,
        directory: Option<&DirectoryMap>,
        usage: &ServerUsage,
        params: &ReplicaParams,
        scheme: &ShardScheme,
        cancel: &CancellationToken,
    ) -> MetaResult<TableConfig> {
        if cancel.is_cancelled() {
            return Err(MetaError::Cancelled);
        }
        let tags = self.resolve_tags(params, scheme)?;

        let hosts_table = |server: &ServerId| match (table_id, directory) {
            (Some(table), Some(map)) => map.contains_key(&(*server, table)),
            _ => false,
        };

        // Director tag first so its first pick becomes the director
        let mut order: Vec<&String> = vec![&params.director_tag];
        order.extend(tags.keys().filter(|tag| **tag != params.director_tag));

        let mut usage = usage.clone();
        let mut shards = Vec::with_capacity(scheme.num_shards());
        for _ in 0..scheme.num_shards() {
            let mut shard = ShardConfig::default();
            for tag in &order {
                let (Some(candidates), Some(&count)) = (tags.get(*tag), params.num_replicas.get(*tag))
                else {
                    continue;
                };

                // Least used first; servers already hosting the table win ties
                let mut ranked: Vec<ServerId> = candidates.iter().copied().collect();
                ranked.sort_by_key(|server| (usage.get(server), !hosts_table(server), *server));

                for server in ranked.into_iter().take(count) {
                    if shard.director.is_none() {
                        shard.director = Some(server);
                    }
                    shard.replicas.insert(server);
                    usage.add(server, 1);
                }
            }
            shards.push(shard);
        }

        let config = TableConfig { shards };
        config
            .validate(scheme)
            .map_err(|e| MetaError::InvariantViolation(e.to_string()))?;
        debug!(
            "Generated config: {} shards over {} servers",
            config.shards.len(),
            config.servers().len()
        );
        Ok(config)
    }
}

fn config_error(msg: impl Into<String>) -> MetaError {
    MetaError::Configuration(msg.into())
}
