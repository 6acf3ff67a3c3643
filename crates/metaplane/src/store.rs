//! Semilattice metadata store
//!
//! The authoritative copy of the cluster metadata. Replication to other nodes
//! happens behind this interface; the control plane only reads snapshots,
//! joins changed snapshots back, and subscribes to changes.

use meta_core::{is_joined, Semilattice};
use tokio::sync::watch;
use tracing::debug;

use crate::metadata::ClusterMetadata;

/// Store of the cluster metadata
pub trait SemilatticeStore: Send + Sync {
    /// Current snapshot
    fn get(&self) -> ClusterMetadata;

    /// Merge `metadata` into the store. Idempotent.
    fn join(&self, metadata: &ClusterMetadata);

    /// Change stream, yielding the merged snapshot after every effective join
    fn subscribe(&self) -> watch::Receiver<ClusterMetadata>;
}

/// In-process store backed by a watch channel
pub struct LocalStore {
    tx: watch::Sender<ClusterMetadata>,
}

impl LocalStore {
    pub fn new(initial: ClusterMetadata) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(ClusterMetadata::new())
    }
}

impl SemilatticeStore for LocalStore {
    fn get(&self) -> ClusterMetadata {
        self.tx.borrow().clone()
    }

    fn join(&self, metadata: &ClusterMetadata) {
        // No-op joins do not wake subscribers
        let changed = self.tx.send_if_modified(|current| {
            if is_joined(current, metadata) {
                return false;
            }
            current.join(metadata);
            true
        });
        debug!("Joined metadata into store (changed: {})", changed);
    }

    fn subscribe(&self) -> watch::Receiver<ClusterMetadata> {
        self.tx.subscribe()
    }
}
