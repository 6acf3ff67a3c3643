//! Table introspection backends
//!
//! One JSON row per table: its configuration, or its live status derived from
//! the table directory. A missing row means the table does not exist (or was
//! dropped).

use std::sync::Arc;

use async_trait::async_trait;
use meta_core::{ServerId, TableId, TableReadiness};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::directory::{entries_for, DirectoryMap, TableDirectory};
use crate::error::{MetaError, MetaResult};
use crate::metadata::{ClusterMetadata, TableMetadata};
use crate::servers::ServerDirectory;
use crate::store::SemilatticeStore;

/// Source of per-table introspection rows
#[async_trait]
pub trait TableMetaBackend: Send + Sync {
    async fn read_row(&self, table_id: TableId, cancel: &CancellationToken)
        -> MetaResult<Option<Value>>;
}

fn live_table<'a>(metadata: &'a ClusterMetadata, table_id: &TableId) -> Option<&'a TableMetadata> {
    metadata.namespaces.get(table_id)
}

fn server_label(servers: &ServerDirectory, id: &ServerId) -> String {
    servers.server_name(id).unwrap_or_else(|| id.to_string())
}

fn check_cancel(cancel: &CancellationToken) -> MetaResult<()> {
    if cancel.is_cancelled() {
        return Err(MetaError::Cancelled);
    }
    Ok(())
}

/// Rows describing each table's configuration
pub struct TableConfigBackend {
    store: Arc<dyn SemilatticeStore>,
    servers: Arc<ServerDirectory>,
}

impl TableConfigBackend {
    pub fn new(store: Arc<dyn SemilatticeStore>, servers: Arc<ServerDirectory>) -> Self {
        Self { store, servers }
    }
}

#[async_trait]
impl TableMetaBackend for TableConfigBackend {
    async fn read_row(
        &self,
        table_id: TableId,
        cancel: &CancellationToken,
    ) -> MetaResult<Option<Value>> {
        check_cancel(cancel)?;
        let metadata = self.store.get();
        let Some(table) = live_table(&metadata, &table_id) else {
            return Ok(None);
        };

        let shards: Vec<Value> = table
            .replication_info()
            .config
            .shards
            .iter()
            .map(|shard| {
                json!({
                    "director": shard.director.map(|id| server_label(&self.servers, &id)),
                    "replicas": shard
                        .replicas
                        .iter()
                        .map(|id| server_label(&self.servers, id))
                        .collect::<Vec<_>>(),
                })
            })
            .collect();

        Ok(Some(json!({
            "id": table_id.to_string(),
            "name": table.name(),
            "db": metadata.database_name(&table.database()),
            "primary_key": table.primary_key(),
            "shards": shards,
        })))
    }
}

/// Rows describing each table's live readiness
pub struct TableStatusBackend {
    store: Arc<dyn SemilatticeStore>,
    directory: Arc<TableDirectory>,
    servers: Arc<ServerDirectory>,
}

impl TableStatusBackend {
    pub fn new(
        store: Arc<dyn SemilatticeStore>,
        directory: Arc<TableDirectory>,
        servers: Arc<ServerDirectory>,
    ) -> Self {
        Self {
            store,
            directory,
            servers,
        }
    }

    /// Least ready replica of any shard, or `None` if the table is gone
    pub fn table_readiness(&self, table_id: &TableId) -> Option<TableReadiness> {
        let metadata = self.store.get();
        let table = live_table(&metadata, table_id)?;
        Some(readiness_of(table, &self.directory.snapshot(), table_id))
    }
}

/// A replica that reports nothing counts as unready
fn readiness_of(table: &TableMetadata, directory: &DirectoryMap, table_id: &TableId) -> TableReadiness {
    let entries = entries_for(directory, table_id);
    table
        .replication_info()
        .config
        .shards
        .iter()
        .flat_map(|shard| shard.replicas.iter())
        .map(|server| {
            entries
                .get(server)
                .map(|status| status.readiness)
                .unwrap_or(TableReadiness::Unready)
        })
        .min()
        .unwrap_or(TableReadiness::Unready)
}

#[async_trait]
impl TableMetaBackend for TableStatusBackend {
    async fn read_row(
        &self,
        table_id: TableId,
        cancel: &CancellationToken,
    ) -> MetaResult<Option<Value>> {
        check_cancel(cancel)?;
        let metadata = self.store.get();
        let Some(table) = live_table(&metadata, &table_id) else {
            return Ok(None);
        };
        let directory = self.directory.snapshot();
        let entries = entries_for(&directory, &table_id);
        let readiness = readiness_of(table, &directory, &table_id);

        let shards: Vec<Value> = table
            .replication_info()
            .config
            .shards
            .iter()
            .map(|shard| {
                let replicas: Vec<Value> = shard
                    .replicas
                    .iter()
                    .map(|server| {
                        let state = entries
                            .get(server)
                            .map(|status| status.readiness.as_str())
                            .unwrap_or("disconnected");
                        json!({
                            "server": server_label(&self.servers, server),
                            "state": state,
                        })
                    })
                    .collect();
                json!({ "replicas": replicas })
            })
            .collect();

        Ok(Some(json!({
            "id": table_id.to_string(),
            "name": table.name(),
            "db": metadata.database_name(&table.database()),
            "status": {
                "ready_for_writes": readiness >= TableReadiness::Writes,
                "ready_for_reads": readiness >= TableReadiness::Reads,
                "all_replicas_ready": readiness >= TableReadiness::Finished,
            },
            "shards": shards,
        })))
    }
}
