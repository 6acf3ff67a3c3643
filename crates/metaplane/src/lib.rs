//! Metaplane - cluster metadata control plane
//!
//! Keeps the catalog of databases and tables as a join-semilattice and
//! exposes the administrative operations on it.
//!
//! # Features
//! - Conflict-free metadata store with change notification
//! - Per-worker metadata mirrors with a propagation barrier
//! - Database and table create/drop/list/find
//! - Replica placement by server tag and uniform resharding
//! - Table readiness waiting driven by the table directory
//!
//! # Usage Example
//! ```ignore
//! use metaplane::{ClusterInterface, LocalStore, MetaplaneConfig};
//!
//! let config = MetaplaneConfig::default();
//! let interface = ClusterInterface::new(&config, store, directory, servers, namespaces, changefeeds);
//! interface.db_create("test", &cancel).await?;
//! ```

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod interface;
pub mod logging;
pub mod metadata;
pub mod namespace;
pub mod readiness;
pub mod scheduler;
pub mod search;
pub mod servers;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use cache::{CrossThreadCache, MetadataMirror};
pub use config::{MetaplaneConfig, Propagation};
pub use directory::TableDirectory;
pub use error::{EntityKind, MetaError, MetaResult};
pub use interface::{ClusterInterface, DbHandle};
pub use metadata::{ClusterMetadata, DatabaseMetadata, TableMetadata};
pub use namespace::{
    CachingNamespaceRepository, ChangefeedClient, NamespaceConnector, NamespaceInterface,
    NamespaceRepository, TableHandle,
};
pub use scheduler::ReplicaParams;
pub use servers::{ServerDirectory, ServerInfo};
pub use store::{LocalStore, SemilatticeStore};
