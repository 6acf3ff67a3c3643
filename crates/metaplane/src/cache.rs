//! Cross-thread metadata cache
//!
//! Every worker reads metadata from its own mirror instead of the store. A
//! mirror holds the databases and namespaces sub-lattices in two separate
//! watch channels, fed by a forwarder task subscribed to the store. Writers
//! use [`MetadataMirror::wait_until_subsumes`] as a propagation barrier: it
//! returns once the mirror has caught up with a snapshot they joined.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use meta_core::is_joined;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Propagation;
use crate::error::{MetaError, MetaResult};
use crate::metadata::{ClusterMetadata, DatabasesMetadata, NamespacesMetadata};
use crate::store::SemilatticeStore;

static NEXT_WORKER_SLOT: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static WORKER_SLOT: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Slot of the current OS thread, assigned round-robin on first use
pub fn worker_slot() -> usize {
    WORKER_SLOT.with(|slot| match slot.get() {
        Some(index) => index,
        None => {
            let index = NEXT_WORKER_SLOT.fetch_add(1, Ordering::Relaxed);
            slot.set(Some(index));
            index
        }
    })
}

/// One worker's read-only view of the metadata
pub struct MetadataMirror {
    index: usize,
    databases: watch::Receiver<DatabasesMetadata>,
    namespaces: watch::Receiver<Arc<NamespacesMetadata>>,
    shutdown: CancellationToken,
}

impl MetadataMirror {
    /// Create a mirror and spawn its forwarder
    ///
    /// Must be called from within a tokio runtime.
    fn spawn(index: usize, store: &dyn SemilatticeStore) -> Self {
        let mut source = store.subscribe();
        let initial = source.borrow_and_update().clone();

        let (db_tx, databases) = watch::channel(initial.databases);
        let (ns_tx, namespaces) = watch::channel(initial.namespaces);
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = source.changed() => {
                        if changed.is_err() {
                            debug!("Mirror {}: store closed", index);
                            break;
                        }
                        let snapshot = source.borrow_and_update().clone();
                        db_tx.send_if_modified(|current| {
                            if *current == snapshot.databases {
                                return false;
                            }
                            *current = snapshot.databases;
                            true
                        });
                        ns_tx.send_if_modified(|current| {
                            if Arc::ptr_eq(current, &snapshot.namespaces)
                                || *current == snapshot.namespaces
                            {
                                return false;
                            }
                            *current = snapshot.namespaces;
                            true
                        });
                    }
                }
            }
            debug!("Mirror {} forwarder stopped", index);
        });

        Self {
            index,
            databases,
            namespaces,
            shutdown,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn read_databases(&self) -> DatabasesMetadata {
        self.databases.borrow().clone()
    }

    pub fn read_namespaces(&self) -> Arc<NamespacesMetadata> {
        self.namespaces.borrow().clone()
    }

    /// Both sub-lattices as one snapshot
    pub fn read(&self) -> ClusterMetadata {
        ClusterMetadata {
            databases: self.read_databases(),
            namespaces: self.read_namespaces(),
        }
    }

    /// Block until this mirror subsumes `target`
    ///
    /// Each sub-lattice is checked on its own; both must subsume. The
    /// predicate is evaluated once eagerly and again on every change.
    pub async fn wait_until_subsumes(
        &self,
        target: &ClusterMetadata,
        cancel: &CancellationToken,
    ) -> MetaResult<()> {
        let mut databases = self.databases.clone();
        let mut namespaces = self.namespaces.clone();

        let wait = async {
            databases
                .wait_for(|local| is_joined(local, &target.databases))
                .await
                .map(|_| ())?;
            namespaces
                .wait_for(|local| {
                    Arc::ptr_eq(local, &target.namespaces)
                        || is_joined(local.as_ref(), target.namespaces.as_ref())
                })
                .await
                .map(|_| ())
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(MetaError::Cancelled),
            result = wait => result.map_err(|_| {
                MetaError::Unavailable(format!("metadata mirror {} is shut down", self.index))
            }),
        }
    }
}

impl Drop for MetadataMirror {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Per-worker mirrors of the cluster metadata
pub struct CrossThreadCache {
    mirrors: Vec<MetadataMirror>,
}

impl CrossThreadCache {
    /// Spawn `num_workers` mirrors (at least one) subscribed to `store`
    pub fn new(store: &dyn SemilatticeStore, num_workers: usize) -> Self {
        let mirrors = (0..num_workers.max(1))
            .map(|index| MetadataMirror::spawn(index, store))
            .collect::<Vec<_>>();
        debug!("Started {} metadata mirrors", mirrors.len());
        Self { mirrors }
    }

    /// Mirror assigned to the calling thread
    pub fn local(&self) -> &MetadataMirror {
        &self.mirrors[worker_slot() % self.mirrors.len()]
    }

    pub fn mirror(&self, index: usize) -> Option<&MetadataMirror> {
        self.mirrors.get(index)
    }

    pub fn num_mirrors(&self) -> usize {
        self.mirrors.len()
    }

    /// Propagation barrier over the local mirror or every mirror
    pub async fn wait_until_subsumes(
        &self,
        target: &ClusterMetadata,
        propagation: Propagation,
        cancel: &CancellationToken,
    ) -> MetaResult<()> {
        match propagation {
            Propagation::Local => self.local().wait_until_subsumes(target, cancel).await,
            Propagation::All => {
                for mirror in &self.mirrors {
                    mirror.wait_until_subsumes(target, cancel).await?;
                }
                Ok(())
            }
        }
    }
}
