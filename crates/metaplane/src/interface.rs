//! Cluster interface
//!
//! Administrative operations on databases and tables. Every mutation follows
//! the same sequence: copy the store's snapshot, check and mutate the copy,
//! join it back, then wait until the metadata mirrors have caught up with
//! the joined result. Reads go to the calling worker's mirror, which any
//! later step of the task may find on a different thread, so the default
//! barrier covers every mirror.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use meta_core::{
    DatabaseId, Deletable, ReplicationInfo, ShardScheme, TableId, TableReadiness,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::CrossThreadCache;
use crate::config::{MetaplaneConfig, Propagation};
use crate::directory::TableDirectory;
use crate::error::{MetaError, MetaResult};
use crate::metadata::{ClusterMetadata, DatabaseMetadata, TableMetadata};
use crate::namespace::{ChangefeedClient, NamespaceRepository, TableHandle};
use crate::readiness::wait_for_tables;
use crate::scheduler::{
    ConfigGenerator, ReplicaParams, ServerUsage, SplitPointCalculator, TagPlacement,
    UniformSplitPoints,
};
use crate::search::{database_by_name, table_by_database, table_by_name, MetadataSearcher};
use crate::servers::ServerDirectory;
use crate::status::{TableConfigBackend, TableMetaBackend, TableStatusBackend};
use crate::store::SemilatticeStore;

/// A resolved database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbHandle {
    pub id: DatabaseId,
    pub name: String,
}

/// Administrative surface of the cluster
pub struct ClusterInterface {
    store: Arc<dyn SemilatticeStore>,
    cache: CrossThreadCache,
    directory: Arc<TableDirectory>,
    servers: Arc<ServerDirectory>,
    config_backend: Arc<TableConfigBackend>,
    status_backend: Arc<TableStatusBackend>,
    config_generator: Arc<dyn ConfigGenerator>,
    split_points: Arc<dyn SplitPointCalculator>,
    namespaces: Arc<dyn NamespaceRepository>,
    changefeeds: Arc<dyn ChangefeedClient>,
    propagation: Propagation,
    system_database: String,
}

impl ClusterInterface {
    /// Create the interface and its per-worker metadata mirrors
    ///
    /// Must be called from within a tokio runtime. Placement defaults to
    /// [`TagPlacement`] and [`UniformSplitPoints`].
    pub fn new(
        config: &MetaplaneConfig,
        store: Arc<dyn SemilatticeStore>,
        directory: Arc<TableDirectory>,
        servers: Arc<ServerDirectory>,
        namespaces: Arc<dyn NamespaceRepository>,
        changefeeds: Arc<dyn ChangefeedClient>,
    ) -> Self {
        let cache = CrossThreadCache::new(store.as_ref(), config.cache.num_workers);
        let config_backend = Arc::new(TableConfigBackend::new(store.clone(), servers.clone()));
        let status_backend = Arc::new(TableStatusBackend::new(
            store.clone(),
            directory.clone(),
            servers.clone(),
        ));

        info!(
            "Cluster interface initialized: {} mirrors, propagation={:?}",
            cache.num_mirrors(),
            config.cache.propagation
        );

        Self {
            config_generator: Arc::new(TagPlacement::new(servers.clone())),
            split_points: Arc::new(UniformSplitPoints::new(config.tables.max_shards)),
            store,
            cache,
            directory,
            servers,
            config_backend,
            status_backend,
            namespaces,
            changefeeds,
            propagation: config.cache.propagation,
            system_database: config.system_database.clone(),
        }
    }

    pub fn with_config_generator(mut self, generator: Arc<dyn ConfigGenerator>) -> Self {
        self.config_generator = generator;
        self
    }

    pub fn with_split_points(mut self, calculator: Arc<dyn SplitPointCalculator>) -> Self {
        self.split_points = calculator;
        self
    }

    pub fn store(&self) -> &Arc<dyn SemilatticeStore> {
        &self.store
    }

    pub fn cache(&self) -> &CrossThreadCache {
        &self.cache
    }

    pub fn directory(&self) -> &Arc<TableDirectory> {
        &self.directory
    }

    pub fn servers(&self) -> &Arc<ServerDirectory> {
        &self.servers
    }

    pub fn status_backend(&self) -> &Arc<TableStatusBackend> {
        &self.status_backend
    }

    // Databases

    pub async fn db_create(&self, name: &str, cancel: &CancellationToken) -> MetaResult<()> {
        self.guarantee_user_database(name)?;
        let mut metadata = self.store.get();

        MetadataSearcher::new(&metadata.databases.databases)
            .find_unique(database_by_name(name))
            .require_absent(|| MetaError::db_exists(name))?;

        let db_id = Uuid::new_v4();
        metadata
            .databases
            .databases
            .insert(db_id, Deletable::Live(DatabaseMetadata::new(name)));

        let metadata = self.commit(&metadata);
        info!("Created database {} ({})", name, db_id);
        self.wait_for_metadata_to_propagate(&metadata, cancel).await
    }

    /// Drop a database and every table in it
    pub async fn db_drop(&self, name: &str, cancel: &CancellationToken) -> MetaResult<()> {
        self.guarantee_user_database(name)?;
        let mut metadata = self.store.get();

        let db_id = *MetadataSearcher::new(&metadata.databases.databases)
            .find_unique(database_by_name(name))
            .require_unique(|| MetaError::db_not_found(name))?
            .0;
        let dropped_tables = metadata.drop_database(&db_id);

        let metadata = self.commit(&metadata);
        info!(
            "Dropped database {} ({}) with {} tables",
            name, db_id, dropped_tables
        );
        self.wait_for_metadata_to_propagate(&metadata, cancel).await
    }

    pub fn db_list(&self) -> BTreeSet<String> {
        let databases = self.cache.local().read_databases();
        MetadataSearcher::new(&databases.databases)
            .find_all(|_, _| true)
            .map(|(_, db)| db.name().to_string())
            .collect()
    }

    pub fn db_find(&self, name: &str) -> MetaResult<DbHandle> {
        self.guarantee_user_database(name)?;
        let databases = self.cache.local().read_databases();
        let (id, _) = MetadataSearcher::new(&databases.databases)
            .find_unique(database_by_name(name))
            .require_unique(|| MetaError::db_not_found(name))?;
        Ok(DbHandle {
            id: *id,
            name: name.to_string(),
        })
    }

    // Tables

    /// Create a single-shard table and wait until it accepts writes
    ///
    /// The wait covers every replica, not just the director: one
    /// unreachable secondary keeps it blocked until `cancel` fires.
    /// `params.num_shards` is ignored: split points can't be chosen for a
    /// table with no data.
    pub async fn table_create(
        &self,
        name: &str,
        db: &DbHandle,
        primary_key: &str,
        params: &ReplicaParams,
        cancel: &CancellationToken,
    ) -> MetaResult<TableId> {
        self.guarantee_user_database(&db.name)?;
        let mut metadata = self.store.get();

        MetadataSearcher::new(&metadata.namespaces.namespaces)
            .find_unique(table_by_name(name, db.id))
            .require_absent(|| MetaError::table_exists(&db.name, name))?;

        let shard_scheme = ShardScheme::one_shard();
        let mut usage = ServerUsage::new();
        for (_, table) in metadata.namespaces.live() {
            usage.add_config(&table.replication_info().config);
        }

        let params = ReplicaParams {
            num_shards: 1,
            ..params.clone()
        };
        let config = self
            .config_generator
            .generate_config(None, None, &usage, &params, &shard_scheme, cancel)
            .await?;

        let table_id = Uuid::new_v4();
        let table = TableMetadata::new(
            name,
            db.id,
            primary_key,
            ReplicationInfo {
                shard_scheme,
                config,
            },
        );
        metadata
            .namespaces_mut()
            .namespaces
            .insert(table_id, Deletable::Live(table));

        let metadata = self.commit(&metadata);
        info!("Created table {}.{} ({})", db.name, name, table_id);
        self.wait_for_metadata_to_propagate(&metadata, cancel).await?;

        // A concurrent drop is not the creator's problem
        match self
            .wait_for_readiness(&[table_id], TableReadiness::Writes, cancel)
            .await
        {
            Ok(()) => {}
            Err(e) if e == MetaError::Cancelled || e.is_fatal() => return Err(e),
            Err(e) => warn!("Table {}.{} not ready after create: {}", db.name, name, e),
        }

        self.wait_for_metadata_to_propagate(&metadata, cancel).await?;
        Ok(table_id)
    }

    pub async fn table_drop(
        &self,
        name: &str,
        db: &DbHandle,
        cancel: &CancellationToken,
    ) -> MetaResult<()> {
        self.guarantee_user_database(&db.name)?;
        let mut metadata = self.store.get();

        let table_id = *MetadataSearcher::new(&metadata.namespaces.namespaces)
            .find_unique(table_by_name(name, db.id))
            .require_unique(|| MetaError::table_not_found(&db.name, name))?
            .0;
        if let Some(entry) = metadata.namespaces_mut().namespaces.get_mut(&table_id) {
            entry.mark_deleted();
        }

        let metadata = self.commit(&metadata);
        info!("Dropped table {}.{} ({})", db.name, name, table_id);
        self.wait_for_metadata_to_propagate(&metadata, cancel).await
    }

    pub fn table_list(&self, db: &DbHandle) -> MetaResult<BTreeSet<String>> {
        self.guarantee_user_database(&db.name)?;
        let namespaces = self.cache.local().read_namespaces();
        Ok(MetadataSearcher::new(&namespaces.namespaces)
            .find_all(table_by_database(db.id))
            .map(|(_, table)| table.name().to_string())
            .collect())
    }

    pub async fn table_find(
        &self,
        name: &str,
        db: &DbHandle,
        cancel: &CancellationToken,
    ) -> MetaResult<TableHandle> {
        self.guarantee_user_database(&db.name)?;
        let (table_id, primary_key) = {
            let namespaces = self.cache.local().read_namespaces();
            let (id, table) = MetadataSearcher::new(&namespaces.namespaces)
                .find_unique(table_by_name(name, db.id))
                .require_unique(|| MetaError::table_not_found(&db.name, name))?;
            (*id, table.primary_key().to_string())
        };

        let namespace = self.namespaces.namespace_interface(table_id, cancel).await?;
        Ok(TableHandle::new(
            table_id,
            name.to_string(),
            db.clone(),
            primary_key,
            namespace,
            self.changefeeds.clone(),
        ))
    }

    /// Map table names to ids
    ///
    /// No names means every table of `db`. Otherwise every name must exist;
    /// names are resolved in sorted order and the first missing one is
    /// reported.
    pub fn resolve_table_ids(
        &self,
        db: &DbHandle,
        names: &BTreeSet<String>,
    ) -> MetaResult<BTreeMap<TableId, String>> {
        self.guarantee_user_database(&db.name)?;
        let namespaces = self.cache.local().read_namespaces();
        let searcher = MetadataSearcher::new(&namespaces.namespaces);

        if names.is_empty() {
            return Ok(searcher
                .find_all(table_by_database(db.id))
                .map(|(id, table)| (*id, table.name().to_string()))
                .collect());
        }

        let mut tables = BTreeMap::new();
        for name in names {
            let (id, table) = searcher
                .find_unique(table_by_name(name, db.id))
                .require_unique(|| MetaError::table_not_found(&db.name, name))?;
            tables.insert(*id, table.name().to_string());
        }
        Ok(tables)
    }

    pub async fn table_config(
        &self,
        db: &DbHandle,
        names: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> MetaResult<Vec<Value>> {
        let tables = self.resolve_table_ids(db, names)?;
        self.read_rows(self.config_backend.as_ref(), db, names, &tables, cancel)
            .await
    }

    pub async fn table_status(
        &self,
        db: &DbHandle,
        names: &BTreeSet<String>,
        cancel: &CancellationToken,
    ) -> MetaResult<Vec<Value>> {
        let tables = self.resolve_table_ids(db, names)?;
        self.read_rows(self.status_backend.as_ref(), db, names, &tables, cancel)
            .await
    }

    /// Wait until the named tables reach `readiness`, then return their status rows
    pub async fn table_wait(
        &self,
        db: &DbHandle,
        names: &BTreeSet<String>,
        readiness: TableReadiness,
        cancel: &CancellationToken,
    ) -> MetaResult<Vec<Value>> {
        let tables = self.resolve_table_ids(db, names)?;
        let ids: Vec<TableId> = tables.keys().copied().collect();
        self.wait_for_readiness(&ids, readiness, cancel).await?;
        self.read_rows(self.status_backend.as_ref(), db, names, &tables, cancel)
            .await
    }

    /// Compute a new shard scheme and replica config for a table
    ///
    /// Commits it unless `dry_run`. Does not wait for the table to become
    /// ready under the new config.
    pub async fn table_reconfigure(
        &self,
        db: &DbHandle,
        name: &str,
        params: &ReplicaParams,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> MetaResult<ReplicationInfo> {
        self.guarantee_user_database(&db.name)?;
        let mut metadata = self.store.get();

        let (table_id, previous_scheme) = {
            let (id, table) = MetadataSearcher::new(&metadata.namespaces.namespaces)
                .find_unique(table_by_name(name, db.id))
                .require_unique(|| MetaError::table_not_found(&db.name, name))?;
            (*id, table.replication_info().shard_scheme.clone())
        };

        // The table's current placement is about to be replaced
        let mut usage = ServerUsage::new();
        for (id, table) in metadata.namespaces.live() {
            if *id != table_id {
                usage.add_config(&table.replication_info().config);
            }
        }

        let shard_scheme = self
            .split_points
            .compute_shard_scheme(table_id, &metadata, params.num_shards, &previous_scheme, cancel)
            .await?;
        let directory = self.directory.snapshot();
        let config = self
            .config_generator
            .generate_config(
                Some(table_id),
                Some(&directory),
                &usage,
                params,
                &shard_scheme,
                cancel,
            )
            .await?;
        let replication_info = ReplicationInfo {
            shard_scheme,
            config,
        };

        if dry_run {
            debug!("Dry run reconfigure of {}.{}", db.name, name);
            return Ok(replication_info);
        }

        let Some(table) = metadata
            .namespaces_mut()
            .namespaces
            .get_mut(&table_id)
            .and_then(Deletable::get_mut)
        else {
            return Err(MetaError::table_not_found(&db.name, name));
        };
        table.replication_info.set(replication_info.clone());
        self.store.join(&metadata);
        info!(
            "Reconfigured table {}.{}: {} shards",
            db.name,
            name,
            replication_info.shard_scheme.num_shards()
        );
        Ok(replication_info)
    }

    // Internals

    fn guarantee_user_database(&self, db_name: &str) -> MetaResult<()> {
        if db_name == self.system_database {
            error!("Cluster interface called on system database `{}`", db_name);
            return Err(MetaError::InvariantViolation(format!(
                "operations on the system database `{}` must not reach the cluster interface",
                db_name
            )));
        }
        Ok(())
    }

    /// Join into the store and read back the merged result
    fn commit(&self, metadata: &ClusterMetadata) -> ClusterMetadata {
        self.store.join(metadata);
        self.store.get()
    }

    /// Block until the mirror(s) subsume `metadata`
    pub async fn wait_for_metadata_to_propagate(
        &self,
        metadata: &ClusterMetadata,
        cancel: &CancellationToken,
    ) -> MetaResult<()> {
        self.cache
            .wait_until_subsumes(metadata, self.propagation, cancel)
            .await
    }

    async fn wait_for_readiness(
        &self,
        table_ids: &[TableId],
        readiness: TableReadiness,
        cancel: &CancellationToken,
    ) -> MetaResult<()> {
        wait_for_tables(
            table_ids,
            readiness,
            self.status_backend.clone(),
            &self.directory,
            self.store.as_ref(),
            cancel,
        )
        .await
    }

    /// One row per table; fails if a named table vanished meanwhile
    async fn read_rows(
        &self,
        backend: &dyn TableMetaBackend,
        db: &DbHandle,
        names: &BTreeSet<String>,
        tables: &BTreeMap<TableId, String>,
        cancel: &CancellationToken,
    ) -> MetaResult<Vec<Value>> {
        let mut rows = Vec::with_capacity(tables.len());
        let mut missing = tables.clone();
        for table_id in tables.keys() {
            if let Some(row) = backend.read_row(*table_id, cancel).await? {
                missing.remove(table_id);
                rows.push(row);
            }
        }

        if !names.is_empty() && rows.len() != names.len() {
            // Report the first missing table, for stable messages
            return Err(match missing.values().next() {
                Some(name) => MetaError::table_not_found(&db.name, name),
                None => MetaError::InvariantViolation(format!(
                    "{} tables requested but {} rows read",
                    names.len(),
                    rows.len()
                )),
            });
        }
        Ok(rows)
    }
}
