//! Cluster metadata root

use meta_core::{DatabaseId, Deletable, Semilattice, TableId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{DatabaseMetadata, TableMetadata};

/// Databases sub-lattice
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabasesMetadata {
    pub databases: BTreeMap<DatabaseId, Deletable<DatabaseMetadata>>,
}

impl Semilattice for DatabasesMetadata {
    fn join(&mut self, other: &Self) {
        self.databases.join(&other.databases);
    }
}

/// Namespaces (tables) sub-lattice
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacesMetadata {
    pub namespaces: BTreeMap<TableId, Deletable<TableMetadata>>,
}

impl NamespacesMetadata {
    /// Live tables only
    pub fn live(&self) -> impl Iterator<Item = (&TableId, &TableMetadata)> {
        self.namespaces
            .iter()
            .filter_map(|(id, entry)| entry.get().map(|table| (id, table)))
    }

    pub fn get(&self, table_id: &TableId) -> Option<&TableMetadata> {
        self.namespaces.get(table_id).and_then(Deletable::get)
    }
}

impl Semilattice for NamespacesMetadata {
    fn join(&mut self, other: &Self) {
        self.namespaces.join(&other.namespaces);
    }
}

/// Cluster metadata
///
/// Snapshot value: operations clone it, mutate the clone and join it back
/// into the store. The namespaces sub-lattice sits behind an `Arc` so
/// snapshots that only touch databases share it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetadata {
    pub databases: DatabasesMetadata,
    pub namespaces: Arc<NamespacesMetadata>,
}

impl ClusterMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writable namespaces, cloned on first write if shared
    pub fn namespaces_mut(&mut self) -> &mut NamespacesMetadata {
        Arc::make_mut(&mut self.namespaces)
    }

    /// Name of a live database
    pub fn database_name(&self, db_id: &DatabaseId) -> Option<&str> {
        self.databases
            .databases
            .get(db_id)
            .and_then(Deletable::get)
            .map(DatabaseMetadata::name)
    }

    /// Tombstone a database and every live table inside it
    ///
    /// Returns the number of tables dropped with it.
    pub fn drop_database(&mut self, db_id: &DatabaseId) -> usize {
        if let Some(entry) = self.databases.databases.get_mut(db_id) {
            entry.mark_deleted();
        }

        let doomed: Vec<TableId> = self
            .namespaces
            .live()
            .filter(|(_, table)| table.database() == *db_id)
            .map(|(id, _)| *id)
            .collect();
        if doomed.is_empty() {
            return 0;
        }

        let namespaces = self.namespaces_mut();
        for id in &doomed {
            if let Some(entry) = namespaces.namespaces.get_mut(id) {
                entry.mark_deleted();
            }
        }
        doomed.len()
    }
}

impl Semilattice for ClusterMetadata {
    fn join(&mut self, other: &Self) {
        self.databases.join(&other.databases);
        self.namespaces.join(&other.namespaces);
    }
}
