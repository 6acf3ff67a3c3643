//! Namespace interfaces and table handles
//!
//! A namespace interface is the per-table access point the query layer reads
//! and writes through. Interfaces are expensive to set up, so they are cached
//! per table and dropped after a period without use.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use meta_core::TableId;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MetaError, MetaResult};
use crate::interface::DbHandle;

/// Per-table query access point
pub trait NamespaceInterface: Send + Sync {
    fn table_id(&self) -> TableId;
}

/// Resolves namespace interfaces by table id
#[async_trait]
pub trait NamespaceRepository: Send + Sync {
    async fn namespace_interface(
        &self,
        table_id: TableId,
        cancel: &CancellationToken,
    ) -> MetaResult<Arc<dyn NamespaceInterface>>;
}

/// Builds a fresh namespace interface
#[async_trait]
pub trait NamespaceConnector: Send + Sync {
    async fn connect(&self, table_id: TableId) -> MetaResult<Arc<dyn NamespaceInterface>>;
}

struct CachedInterface {
    interface: Arc<dyn NamespaceInterface>,
    last_used: Instant,
}

/// Repository that memoises interfaces from a connector
pub struct CachingNamespaceRepository {
    connector: Arc<dyn NamespaceConnector>,
    expiration: Duration,
    entries: Mutex<HashMap<TableId, CachedInterface>>,
}

impl CachingNamespaceRepository {
    pub fn new(connector: Arc<dyn NamespaceConnector>, expiration: Duration) -> Self {
        Self {
            connector,
            expiration,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drop interfaces unused for longer than the expiration
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, cached| now.duration_since(cached.last_used) < self.expiration);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!("Evicted {} idle namespace interfaces", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl NamespaceRepository for CachingNamespaceRepository {
    async fn namespace_interface(
        &self,
        table_id: TableId,
        cancel: &CancellationToken,
    ) -> MetaResult<Arc<dyn NamespaceInterface>> {
        self.evict_expired();
        let hit = self.entries.lock().get_mut(&table_id).map(|cached| {
            cached.last_used = Instant::now();
            cached.interface.clone()
        });
        if let Some(interface) = hit {
            return Ok(interface);
        }

        let interface = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MetaError::Cancelled),
            interface = self.connector.connect(table_id) => interface?,
        };

        // Another caller may have connected meanwhile; keep the first one
        let mut entries = self.entries.lock();
        let cached = entries.entry(table_id).or_insert_with(|| CachedInterface {
            interface,
            last_used: Instant::now(),
        });
        cached.last_used = Instant::now();
        Ok(cached.interface.clone())
    }
}

/// Stream of change documents for one table
pub type Changefeed = mpsc::Receiver<Value>;

/// Opens change feeds
#[async_trait]
pub trait ChangefeedClient: Send + Sync {
    async fn subscribe(&self, table_id: TableId, cancel: &CancellationToken)
        -> MetaResult<Changefeed>;
}

/// A resolved table, ready for reads, writes and change feeds
#[derive(Clone)]
pub struct TableHandle {
    pub id: TableId,
    pub name: String,
    pub db: DbHandle,
    pub primary_key: String,
    pub namespace: Arc<dyn NamespaceInterface>,
    changefeed: Arc<dyn ChangefeedClient>,
}

impl TableHandle {
    pub fn new(
        id: TableId,
        name: String,
        db: DbHandle,
        primary_key: String,
        namespace: Arc<dyn NamespaceInterface>,
        changefeed: Arc<dyn ChangefeedClient>,
    ) -> Self {
        Self {
            id,
            name,
            db,
            primary_key,
            namespace,
            changefeed,
        }
    }

    pub async fn subscribe(&self, cancel: &CancellationToken) -> MetaResult<Changefeed> {
        self.changefeed.subscribe(self.id, cancel).await
    }
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("db", &self.db)
            .field("primary_key", &self.primary_key)
            .finish_non_exhaustive()
    }
}
