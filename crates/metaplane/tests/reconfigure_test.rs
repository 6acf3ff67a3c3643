mod common;

use common::test_cluster::TestCluster;
use common::within;
use meta_core::{ShardScheme, TableReadiness};
use metaplane::{MetaError, ReplicaParams, SemilatticeStore};

#[tokio::test]
async fn test_reconfigure_dry_run_leaves_metadata() {
    let cluster = TestCluster::new(3);
    let d = cluster.create_db("d").await;
    let id = cluster.create_table(&d, "t").await;
    let before = cluster.store.get();

    let info = cluster
        .interface
        .table_reconfigure(&d, "t", &ReplicaParams::new(3, "default", 2), true, &cluster.cancel)
        .await
        .unwrap();
    assert_eq!(info.shard_scheme, ShardScheme::uniform(3));
    assert_eq!(info.config.shards.len(), 3);
    for shard in &info.config.shards {
        assert_eq!(shard.replicas.len(), 2);
        assert!(shard.director.is_some());
    }

    let after = cluster.store.get();
    assert_eq!(before, after);
    assert_eq!(
        after.namespaces.get(&id).unwrap().replication_info().shard_scheme,
        ShardScheme::one_shard()
    );
}

#[tokio::test]
async fn test_reconfigure_commits() {
    let cluster = TestCluster::new(3);
    let d = cluster.create_db("d").await;
    let id = cluster.create_table(&d, "t").await;

    let info = cluster
        .interface
        .table_reconfigure(&d, "t", &ReplicaParams::new(2, "default", 3), false, &cluster.cancel)
        .await
        .unwrap();

    let metadata = cluster.store.get();
    assert_eq!(metadata.namespaces.get(&id).unwrap().replication_info(), &info);

    // Visible to introspection without waiting
    let rows = cluster
        .interface
        .table_config(&d, &TestCluster::names(&["t"]), &cluster.cancel)
        .await
        .unwrap();
    assert_eq!(rows[0]["shards"].as_array().unwrap().len(), 2);

    // The reactor brings the new replicas up
    within(cluster.interface.table_wait(
        &d,
        &TestCluster::names(&["t"]),
        TableReadiness::Finished,
        &cluster.cancel,
    ))
    .await
    .unwrap();
}

#[tokio::test]
async fn test_reconfigure_keeps_scheme_for_same_shard_count() {
    let cluster = TestCluster::new(2);
    let d = cluster.create_db("d").await;
    cluster.create_table(&d, "t").await;

    let info = cluster
        .interface
        .table_reconfigure(&d, "t", &ReplicaParams::new(1, "default", 2), false, &cluster.cancel)
        .await
        .unwrap();
    assert_eq!(info.shard_scheme, ShardScheme::one_shard());
    assert_eq!(info.config.shards[0].replicas.len(), 2);
}

#[tokio::test]
async fn test_reconfigure_errors() {
    let cluster = TestCluster::new(2);
    let interface = &cluster.interface;
    let d = cluster.create_db("d").await;
    cluster.create_table(&d, "t").await;

    let err = interface
        .table_reconfigure(&d, "t", &ReplicaParams::new(9, "default", 1), false, &cluster.cancel)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Maximum number of shards is 8.");

    let err = interface
        .table_reconfigure(&d, "t", &ReplicaParams::new(1, "default", 5), false, &cluster.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Configuration(_)));

    let err = interface
        .table_reconfigure(&d, "t", &ReplicaParams::new(1, "ssd", 1), false, &cluster.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Configuration(_)));

    let err = interface
        .table_reconfigure(&d, "nope", &ReplicaParams::new(1, "default", 1), true, &cluster.cancel)
        .await
        .unwrap_err();
    assert_eq!(err, MetaError::table_not_found("d", "nope"));
}

#[tokio::test]
async fn test_reconfigure_ignores_own_usage() {
    let cluster = TestCluster::new(1);
    let d = cluster.create_db("d").await;
    let id = cluster.create_table(&d, "t").await;

    let info = cluster
        .interface
        .table_reconfigure(&d, "t", &ReplicaParams::new(1, "default", 1), true, &cluster.cancel)
        .await
        .unwrap();
    let current = cluster.store.get();
    let current = current.namespaces.get(&id).unwrap().replication_info();
    assert_eq!(info.config, current.config);
}
