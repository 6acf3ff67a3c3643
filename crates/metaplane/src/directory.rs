//! Per-server table directory
//!
//! Live map of what each server reports about each table replica it hosts.
//! Written by the data-movement layer, read by the readiness waiter and the
//! status backend.

use std::collections::BTreeMap;

use meta_core::{ServerId, TableId, TableReadiness};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// What one server reports for one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStatus {
    pub readiness: TableReadiness,
}

pub type DirectoryMap = BTreeMap<(ServerId, TableId), ReplicaStatus>;

/// Directory of replica states, published on a watch channel
pub struct TableDirectory {
    tx: watch::Sender<DirectoryMap>,
}

impl TableDirectory {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(DirectoryMap::new());
        Self { tx }
    }

    pub fn set(&self, server: ServerId, table: TableId, readiness: TableReadiness) {
        let status = ReplicaStatus { readiness };
        self.tx.send_if_modified(|map| {
            map.insert((server, table), status) != Some(status)
        });
    }

    pub fn remove(&self, server: ServerId, table: TableId) {
        self.tx
            .send_if_modified(|map| map.remove(&(server, table)).is_some());
    }

    /// Forget everything a server reported
    pub fn remove_server(&self, server: ServerId) {
        let removed = self.tx.send_if_modified(|map| {
            let before = map.len();
            map.retain(|(s, _), _| *s != server);
            map.len() != before
        });
        if removed {
            debug!("Removed directory entries of server {}", server);
        }
    }

    /// Drop every replica entry of a table
    pub fn remove_table(&self, table: TableId) {
        self.tx.send_if_modified(|map| {
            let before = map.len();
            map.retain(|(_, t), _| *t != table);
            map.len() != before
        });
    }

    /// Replica states of one table, by server
    pub fn table_entries(&self, table: &TableId) -> BTreeMap<ServerId, ReplicaStatus> {
        entries_for(&self.tx.borrow(), table)
    }

    pub fn hosts_table(&self, server: &ServerId, table: &TableId) -> bool {
        self.tx.borrow().contains_key(&(*server, *table))
    }

    pub fn snapshot(&self) -> DirectoryMap {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DirectoryMap> {
        self.tx.subscribe()
    }
}

impl Default for TableDirectory {
    fn default() -> Self {
        Self::new()
    }
}

/// Replica states of one table within a directory snapshot
pub fn entries_for(map: &DirectoryMap, table: &TableId) -> BTreeMap<ServerId, ReplicaStatus> {
    map.iter()
        .filter(|((_, t), _)| t == table)
        .map(|((server, _), status)| (*server, *status))
        .collect()
}
