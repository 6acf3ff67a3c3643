//! Core cluster metadata types
//!
//! Shared by every component of the control plane:
//! - Join-semilattice primitives (versioned registers, tombstones, map joins)
//! - Shard schemes and per-shard replica assignment
//! - Table readiness levels

pub mod semilattice;
pub mod shard;

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Re-export commonly used types
pub use semilattice::{is_joined, Deletable, Semilattice, VersionStamp, Versioned};
pub use shard::{ReplicationInfo, ShardConfig, ShardError, ShardScheme, TableConfig, KEY_SPACE};

/// Database identifier
pub type DatabaseId = Uuid;
/// Table (namespace) identifier
pub type TableId = Uuid;
/// Server identifier
pub type ServerId = Uuid;

/// How far a table has come up, in increasing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableReadiness {
    /// Not serving anything yet
    Unready,
    /// Accepting writes
    Writes,
    /// Accepting writes and reads
    Reads,
    /// All replicas ready
    Finished,
}

impl TableReadiness {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableReadiness::Unready => "unready",
            TableReadiness::Writes => "ready_for_writes",
            TableReadiness::Reads => "ready_for_reads",
            TableReadiness::Finished => "all_replicas_ready",
        }
    }
}

impl fmt::Display for TableReadiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
