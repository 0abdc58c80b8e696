//! Creating, observing and deleting whole replication groups.

use std::time::Duration;

use replication_group_reconciler::client::{
    ControlPlaneError, GroupSettings, Operation, ResourceKind, TopologyStatus,
};
use replication_group_reconciler::controller::error::Phase;
use replication_group_reconciler::controller::provisioner::{GroupBlueprint, NodeGroupLayout};
use replication_group_reconciler::{Error, Topology};
use tokio::time::Instant;

use crate::fixtures::{GROUP, Harness, flat};

fn busy_group() -> ControlPlaneError {
    ControlPlaneError::InvalidState {
        kind: ResourceKind::ReplicationGroup,
        id: GROUP.to_string(),
        message: "replication group has a snapshot in progress".to_string(),
    }
}

// ============================================================================
// Create and Restore
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_create_flat_group() {
    let h = Harness::empty();
    let blueprint = GroupBlueprint {
        automatic_failover_enabled: true,
        settings: GroupSettings {
            description: "orders cache".to_string(),
            ..Default::default()
        },
        ..GroupBlueprint::flat("Orders", 3)
    };

    let topology = h.reconciler.create(&blueprint).await.unwrap();

    assert_eq!(topology.replication_group_id, "orders");
    assert_eq!(topology.status, TopologyStatus::Available);
    assert_eq!(
        topology.member_clusters,
        vec!["orders-001", "orders-002", "orders-003"]
    );
    assert!(topology.automatic_failover_enabled);
    assert_eq!(h.count(Operation::CreateTopology).await, 1);
}

/// A group created from a blueprint can be reconciled straight away.
#[tokio::test(start_paused = true)]
async fn test_create_then_reconcile() {
    let h = Harness::empty();
    let created = h
        .reconciler
        .create(&GroupBlueprint::flat(GROUP, 2))
        .await
        .unwrap();

    let outcome = h.reconciler.reconcile(&created, &flat(3), None).await.unwrap();
    assert_eq!(outcome.added, vec!["cache-003"]);
}

#[tokio::test(start_paused = true)]
async fn test_restore_requires_slot_layout() {
    let h = Harness::empty();
    let blueprint = GroupBlueprint {
        snapshot_arns: vec!["arn:aws:s3:::backups/cache-0001.rdb".to_string()],
        ..GroupBlueprint::sharded(GROUP, 2, 1)
    };

    let err = h.reconciler.create(&blueprint).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(h.calls().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_restore_from_snapshots() {
    let h = Harness::empty();
    let blueprint = GroupBlueprint {
        snapshot_arns: vec![
            "arn:aws:s3:::backups/cache-0001.rdb".to_string(),
            "arn:aws:s3:::backups/cache-0002.rdb".to_string(),
        ],
        node_group_layout: Some(NodeGroupLayout {
            slots: vec!["0-8191".to_string(), "8192-16383".to_string()],
            primary_availability_zone: Some("us-east-1a".to_string()),
            replica_availability_zones: vec!["us-east-1b".to_string()],
        }),
        ..GroupBlueprint::sharded(GROUP, 2, 1)
    };

    let request = blueprint.to_request().unwrap();
    assert_eq!(request.node_group_configuration.len(), 2);
    assert_eq!(request.node_group_configuration[1].slots, "8192-16383");

    let topology = h.reconciler.create(&blueprint).await.unwrap();
    assert_eq!(topology.shard_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_create_existing_group_fails() {
    let h = Harness::seeded(flat(1)).await;

    let err = h
        .reconciler
        .create(&GroupBlueprint::flat(GROUP, 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::NonRetryable {
            source: ControlPlaneError::AlreadyExists { .. },
            phase: Phase::Submit,
            ..
        }
    ));
    // Not retried.
    assert_eq!(h.count(Operation::CreateTopology).await, 1);
}

// ============================================================================
// Observe
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_observe_normalizes_id() {
    let h = Harness::seeded(flat(2)).await;

    let topology: Topology = h.reconciler.observe("CACHE").await.unwrap();
    assert_eq!(topology.member_count, 2);

    let err = h.reconciler.observe("missing").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        h.reconciler.observe("not--valid").await,
        Err(Error::Validation(_))
    ));
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_delete_retries_while_group_busy() {
    let h = Harness::seeded(flat(2)).await;
    h.sim
        .inject_fault(Operation::DeleteTopology, None, busy_group(), 3)
        .await;

    h.reconciler.delete(GROUP, Some("cache-final")).await.unwrap();

    assert_eq!(h.count(Operation::DeleteTopology).await, 4);
    assert!(h.sim.topology(GROUP).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_delete_gives_up_after_ten_minutes() {
    let h = Harness::seeded(flat(2)).await;
    h.sim
        .set_topology_status(GROUP, TopologyStatus::Modifying)
        .await;

    let start = Instant::now();
    let err = h.reconciler.delete(GROUP, None).await.unwrap_err();

    assert_eq!(start.elapsed(), Duration::from_secs(10 * 60));
    assert!(matches!(
        err,
        Error::NonRetryable {
            operation: "delete replication group",
            ..
        }
    ));
    assert!(h.sim.topology(GROUP).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_delete_missing_group_is_ok() {
    let h = Harness::empty();

    h.reconciler.delete(GROUP, None).await.unwrap();
    assert_eq!(h.count(Operation::DeleteTopology).await, 1);
    assert_eq!(h.count(Operation::DescribeTopology).await, 0);
}
