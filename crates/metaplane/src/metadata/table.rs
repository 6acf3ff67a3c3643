//! Table (namespace) entries

use meta_core::{DatabaseId, ReplicationInfo, Semilattice, Versioned};
use serde::{Deserialize, Serialize};

/// Table metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: Versioned<String>,
    /// Owning database
    pub database: Versioned<DatabaseId>,
    pub primary_key: Versioned<String>,
    /// Shard scheme and replica config, replaced as a unit
    pub replication_info: Versioned<ReplicationInfo>,
}

impl TableMetadata {
    pub fn new(
        name: impl Into<String>,
        database: DatabaseId,
        primary_key: impl Into<String>,
        replication_info: ReplicationInfo,
    ) -> Self {
        Self {
            name: Versioned::new(name.into()),
            database: Versioned::new(database),
            primary_key: Versioned::new(primary_key.into()),
            replication_info: Versioned::new(replication_info),
        }
    }

    pub fn name(&self) -> &str {
        self.name.get()
    }

    pub fn database(&self) -> DatabaseId {
        *self.database.get()
    }

    pub fn primary_key(&self) -> &str {
        self.primary_key.get()
    }

    pub fn replication_info(&self) -> &ReplicationInfo {
        self.replication_info.get()
    }
}

impl Semilattice for TableMetadata {
    fn join(&mut self, other: &Self) {
        self.name.join(&other.name);
        self.database.join(&other.database);
        self.primary_key.join(&other.primary_key);
        self.replication_info.join(&other.replication_info);
    }
}
