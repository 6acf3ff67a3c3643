//! Table readiness waiting
//!
//! A [`TableWaiter`] watches one table until it reaches a readiness level.
//! It wakes on every change of the table directory or the metadata store and
//! re-derives the readiness from the status backend. A table that no longer
//! exists is as ready as it will ever be, so it satisfies any wait.

use std::sync::Arc;

use meta_core::{TableId, TableReadiness};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::directory::{DirectoryMap, TableDirectory};
use crate::error::{MetaError, MetaResult};
use crate::metadata::ClusterMetadata;
use crate::status::TableStatusBackend;
use crate::store::SemilatticeStore;

/// Whether a wait had to suspend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waited {
    /// Satisfied on the first check
    Immediate,
    /// Suspended at least once
    Waited,
}

/// Watches one table's readiness
pub struct TableWaiter {
    table_id: TableId,
    backend: Arc<TableStatusBackend>,
    directory: watch::Receiver<DirectoryMap>,
    metadata: watch::Receiver<ClusterMetadata>,
    deleted: bool,
}

impl TableWaiter {
    pub fn new(
        table_id: TableId,
        backend: Arc<TableStatusBackend>,
        directory: &TableDirectory,
        store: &dyn SemilatticeStore,
    ) -> Self {
        Self {
            table_id,
            backend,
            directory: directory.subscribe(),
            metadata: store.subscribe(),
            deleted: false,
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    /// Set once a check found the table gone
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Block until the table reaches `target` or is deleted
    pub async fn wait_ready(
        &mut self,
        target: TableReadiness,
        cancel: &CancellationToken,
    ) -> MetaResult<Waited> {
        let mut checks = 0usize;
        loop {
            // Mark the current versions seen before checking, so a change
            // landing between the check and the select still wakes us
            let _ = self.directory.borrow_and_update();
            let _ = self.metadata.borrow_and_update();

            checks += 1;
            if self.check_ready(target) {
                return Ok(if checks > 1 {
                    Waited::Waited
                } else {
                    Waited::Immediate
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(MetaError::Cancelled),
                changed = self.directory.changed() => {
                    changed.map_err(|_| MetaError::Unavailable("table directory closed".to_string()))?;
                }
                changed = self.metadata.changed() => {
                    changed.map_err(|_| MetaError::Unavailable("metadata store closed".to_string()))?;
                }
            }
        }
    }

    /// Non-blocking check against the latest state
    pub fn check_ready(&mut self, target: TableReadiness) -> bool {
        match self.backend.table_readiness(&self.table_id) {
            None => {
                self.deleted = true;
                true
            }
            Some(actual) => actual >= target,
        }
    }
}

/// Wait until every table in `table_ids` reaches `target`
///
/// Each table is waited on in turn. If any wait suspended and there is more
/// than one table, every table is checked once more before returning and the
/// whole loop restarts if one is not ready. This assumes readiness does not
/// regress; a table that loses readiness after its recheck is not caught.
pub async fn wait_for_tables(
    table_ids: &[TableId],
    target: TableReadiness,
    backend: Arc<TableStatusBackend>,
    directory: &TableDirectory,
    store: &dyn SemilatticeStore,
    cancel: &CancellationToken,
) -> MetaResult<()> {
    let mut waiters: Vec<TableWaiter> = table_ids
        .iter()
        .map(|id| TableWaiter::new(*id, backend.clone(), directory, store))
        .collect();

    loop {
        let mut immediate = true;
        for waiter in waiters.iter_mut() {
            if waiter.wait_ready(target, cancel).await? == Waited::Waited {
                immediate = false;
            }
        }

        if !immediate && waiters.len() > 1 {
            let stale = waiters.iter_mut().position(|w| !w.check_ready(target));
            if let Some(index) = stale {
                debug!(
                    "Table {} not {} on recheck, waiting again",
                    waiters[index].table_id(),
                    target
                );
                continue;
            }
        }

        debug!("{} tables reached {}", waiters.len(), target);
        return Ok(());
    }
}
