// test_cluster.rs

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use meta_core::{ServerId, TableId, TableReadiness};
use metaplane::namespace::Changefeed;
use metaplane::{
    CachingNamespaceRepository, ChangefeedClient, ClusterInterface, DbHandle, LocalStore,
    MetaResult, MetaplaneConfig, NamespaceConnector, NamespaceInterface, ReplicaParams,
    SemilatticeStore, ServerDirectory, ServerInfo, TableDirectory,
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct TestNamespace(TableId);

impl NamespaceInterface for TestNamespace {
    fn table_id(&self) -> TableId {
        self.0
    }
}

pub struct TestConnector;

#[async_trait]
impl NamespaceConnector for TestConnector {
    async fn connect(&self, table_id: TableId) -> MetaResult<Arc<dyn NamespaceInterface>> {
        Ok(Arc::new(TestNamespace(table_id)))
    }
}

/// Emits a single document naming the table, then closes
pub struct TestChangefeeds;

#[async_trait]
impl ChangefeedClient for TestChangefeeds {
    async fn subscribe(&self, table_id: TableId, _cancel: &CancellationToken) -> MetaResult<Changefeed> {
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(json!({ "table": table_id.to_string() })).await;
        Ok(rx)
    }
}

/// Everything a cluster interface needs, on one runtime
pub struct TestCluster {
    pub store: Arc<LocalStore>,
    pub servers: Arc<ServerDirectory>,
    pub directory: Arc<TableDirectory>,
    pub interface: Arc<ClusterInterface>,
    pub server_ids: Vec<ServerId>,
    pub cancel: CancellationToken,
    reactor: CancellationToken,
}

impl TestCluster {
    /// A cluster whose replicas report full readiness for every live table
    pub fn new(num_servers: usize) -> Self {
        let cluster = Self::without_reactor(num_servers);
        cluster.spawn_reactor();
        cluster
    }

    /// Like [`TestCluster::new`], built from `config`
    pub fn with_reactor(config: &MetaplaneConfig, num_servers: usize) -> Self {
        let cluster = Self::with_config(config, num_servers);
        cluster.spawn_reactor();
        cluster
    }

    /// A cluster where nothing reports readiness unless the test does
    pub fn without_reactor(num_servers: usize) -> Self {
        let mut config = MetaplaneConfig::default();
        config.cache.num_workers = 2;
        config.tables.max_shards = 8;
        Self::with_config(&config, num_servers)
    }

    pub fn with_config(config: &MetaplaneConfig, num_servers: usize) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let store = Arc::new(LocalStore::default());
        let servers = Arc::new(ServerDirectory::new());
        let directory = Arc::new(TableDirectory::new());

        let server_ids = (0..num_servers)
            .map(|i| {
                let info = ServerInfo::new(format!("server{}", i));
                let id = info.id;
                servers.register(info);
                id
            })
            .collect();

        let namespaces = Arc::new(CachingNamespaceRepository::new(
            Arc::new(TestConnector),
            config.namespaces.expiration(),
        ));
        let interface = Arc::new(ClusterInterface::new(
            config,
            store.clone(),
            directory.clone(),
            servers.clone(),
            namespaces,
            Arc::new(TestChangefeeds),
        ));

        Self {
            store,
            servers,
            directory,
            interface,
            server_ids,
            cancel: CancellationToken::new(),
            reactor: CancellationToken::new(),
        }
    }

    /// Mirror the store into the directory: every replica of a live table is
    /// `Finished`, dropped tables disappear
    fn spawn_reactor(&self) {
        let mut metadata = self.store.subscribe();
        let directory = self.directory.clone();
        let shutdown = self.reactor.clone();
        tokio::spawn(async move {
            loop {
                let snapshot = metadata.borrow_and_update().clone();
                for (table_id, entry) in snapshot.namespaces.namespaces.iter() {
                    match entry.get() {
                        Some(table) => {
                            for shard in &table.replication_info().config.shards {
                                for server in &shard.replicas {
                                    directory.set(*server, *table_id, TableReadiness::Finished);
                                }
                            }
                        }
                        None => directory.remove_table(*table_id),
                    }
                }
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    changed = metadata.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }

    pub fn params(&self, replicas: usize) -> ReplicaParams {
        ReplicaParams::new(1, "default", replicas)
    }

    pub async fn create_db(&self, name: &str) -> DbHandle {
        self.interface.db_create(name, &self.cancel).await.unwrap();
        self.interface.db_find(name).unwrap()
    }

    pub async fn create_table(&self, db: &DbHandle, name: &str) -> TableId {
        super::within(self.interface.table_create(
            name,
            db,
            "id",
            &self.params(1),
            &self.cancel,
        ))
        .await
        .unwrap()
    }

    pub fn names(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    /// Give spawned tasks a chance to run
    pub async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

impl Drop for TestCluster {
    fn drop(&mut self) {
        self.reactor.cancel();
    }
}
