//! Cluster metadata definitions
//!
//! The replicated metadata is a join-semilattice made of two sub-lattices:
//! databases and namespaces (tables). Entries are tombstoned, never removed.

mod cluster;
mod database;
mod table;

pub use cluster::{ClusterMetadata, DatabasesMetadata, NamespacesMetadata};
pub use database::DatabaseMetadata;
pub use table::TableMetadata;
