mod common;

use std::collections::BTreeSet;

use common::test_cluster::TestCluster;
use common::within;
use metaplane::{MetaError, SemilatticeStore};

#[tokio::test]
async fn test_table_lifecycle() {
    let cluster = TestCluster::new(3);
    let interface = &cluster.interface;
    let d = cluster.create_db("d").await;

    within(interface.table_create("t1", &d, "id", &cluster.params(1), &cluster.cancel))
        .await
        .unwrap();
    assert_eq!(interface.table_list(&d).unwrap(), TestCluster::names(&["t1"]));

    let err = interface
        .table_create("t1", &d, "id", &cluster.params(1), &cluster.cancel)
        .await
        .unwrap_err();
    assert_eq!(err, MetaError::table_exists("d", "t1"));
    assert_eq!(err.to_string(), "Table `d.t1` already exists.");

    interface.table_drop("t1", &d, &cluster.cancel).await.unwrap();
    assert!(interface.table_list(&d).unwrap().is_empty());

    let err = interface.table_drop("t1", &d, &cluster.cancel).await.unwrap_err();
    assert_eq!(err.to_string(), "Table `d.t1` does not exist.");
}

#[tokio::test]
async fn test_same_table_name_in_different_databases() {
    let cluster = TestCluster::new(1);
    let d = cluster.create_db("d").await;
    let e = cluster.create_db("e").await;

    let first = cluster.create_table(&d, "t").await;
    let second = cluster.create_table(&e, "t").await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_table_find_returns_primary_key_and_namespace() {
    let cluster = TestCluster::new(1);
    let interface = &cluster.interface;
    let d = cluster.create_db("d").await;

    let id = within(interface.table_create(
        "users",
        &d,
        "user_id",
        &cluster.params(1),
        &cluster.cancel,
    ))
    .await
    .unwrap();

    let table = within(interface.table_find("users", &d, &cluster.cancel))
        .await
        .unwrap();
    assert_eq!(table.id, id);
    assert_eq!(table.primary_key, "user_id");
    assert_eq!(table.db, d);
    assert_eq!(table.namespace.table_id(), id);

    let mut feed = table.subscribe(&cluster.cancel).await.unwrap();
    let change = feed.recv().await.unwrap();
    assert_eq!(change["table"], id.to_string());

    let err = interface
        .table_find("missing", &d, &cluster.cancel)
        .await
        .unwrap_err();
    assert_eq!(err, MetaError::table_not_found("d", "missing"));
}

#[tokio::test]
async fn test_table_create_places_on_least_used_servers() {
    let cluster = TestCluster::new(3);
    let d = cluster.create_db("d").await;

    for name in ["a", "b", "c"] {
        cluster.create_table(&d, name).await;
    }

    let metadata = cluster.store.get();
    let directors: BTreeSet<_> = metadata
        .namespaces
        .live()
        .filter_map(|(_, table)| table.replication_info().config.shards[0].director)
        .collect();
    assert_eq!(directors.len(), 3);
}

#[tokio::test]
async fn test_table_create_ignores_requested_shards() {
    let cluster = TestCluster::new(2);
    let d = cluster.create_db("d").await;

    let mut params = cluster.params(2);
    params.num_shards = 4;
    let id = within(cluster.interface.table_create("t", &d, "id", &params, &cluster.cancel))
        .await
        .unwrap();

    let metadata = cluster.store.get();
    let info = metadata.namespaces.get(&id).unwrap().replication_info();
    assert_eq!(info.shard_scheme.num_shards(), 1);
    assert_eq!(info.config.shards[0].replicas.len(), 2);
}

#[tokio::test]
async fn test_table_create_config_errors() {
    let cluster = TestCluster::new(2);
    let interface = &cluster.interface;
    let d = cluster.create_db("d").await;

    let err = interface
        .table_create("t", &d, "id", &cluster.params(3), &cluster.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Configuration(_)));

    let err = interface
        .table_create("t", &d, "id", &cluster.params(0), &cluster.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Configuration(_)));

    // Nothing was committed
    assert!(interface.table_list(&d).unwrap().is_empty());
}

#[tokio::test]
async fn test_resolve_table_ids() {
    let cluster = TestCluster::new(1);
    let interface = &cluster.interface;
    let d = cluster.create_db("d").await;
    let a = cluster.create_table(&d, "a").await;
    let c = cluster.create_table(&d, "c").await;

    let all = interface.resolve_table_ids(&d, &BTreeSet::new()).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[&a], "a");
    assert_eq!(all[&c], "c");

    let err = interface
        .resolve_table_ids(&d, &TestCluster::names(&["a", "b"]))
        .unwrap_err();
    assert_eq!(err, MetaError::table_not_found("d", "b"));
    assert_eq!(err.to_string(), "Table `d.b` does not exist.");

    // First missing name in sorted order
    let err = interface
        .resolve_table_ids(&d, &TestCluster::names(&["z", "b"]))
        .unwrap_err();
    assert_eq!(err, MetaError::table_not_found("d", "b"));
}

#[tokio::test]
async fn test_table_config_rows() {
    let cluster = TestCluster::new(2);
    let interface = &cluster.interface;
    let d = cluster.create_db("d").await;
    let id = within(interface.table_create("t", &d, "pk", &cluster.params(2), &cluster.cancel))
        .await
        .unwrap();
    cluster.create_table(&d, "u").await;

    let rows = interface
        .table_config(&d, &TestCluster::names(&["t"]), &cluster.cancel)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], id.to_string());
    assert_eq!(rows[0]["db"], "d");
    assert_eq!(rows[0]["primary_key"], "pk");
    assert_eq!(rows[0]["shards"][0]["replicas"].as_array().unwrap().len(), 2);

    let rows = interface
        .table_config(&d, &BTreeSet::new(), &cluster.cancel)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_table_status_rows() {
    let cluster = TestCluster::new(1);
    let d = cluster.create_db("d").await;
    cluster.create_table(&d, "t").await;

    let rows = cluster
        .interface
        .table_status(&d, &TestCluster::names(&["t"]), &cluster.cancel)
        .await
        .unwrap();
    assert_eq!(rows[0]["name"], "t");
    assert_eq!(rows[0]["status"]["ready_for_writes"], true);
    assert_eq!(rows[0]["shards"][0]["replicas"][0]["server"], "server0");
}

#[tokio::test]
async fn test_system_database_tables_are_rejected() {
    let cluster = TestCluster::new(1);
    let system = metaplane::DbHandle {
        id: uuid::Uuid::new_v4(),
        name: "system".to_string(),
    };

    let err = cluster.interface.table_list(&system).unwrap_err();
    assert!(matches!(err, MetaError::InvariantViolation(_)));
    let err = cluster
        .interface
        .table_create("t", &system, "id", &cluster.params(1), &cluster.cancel)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}
