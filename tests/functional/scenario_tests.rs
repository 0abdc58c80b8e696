//! End-to-end reconciliation scenarios.

use std::time::Duration;

use replication_group_reconciler::{Error, Topology};
use replication_group_reconciler::client::{
    Call, ControlPlaneError, GroupSettings, Operation, ResourceKind, TopologyStatus,
};
use replication_group_reconciler::controller::decommissioner::PrimaryReassignment;
use replication_group_reconciler::controller::error::Phase;
use tokio::time::Instant;

use crate::fixtures::{GROUP, Harness, first_index, flat, last_index};

// ============================================================================
// Scale Out
// ============================================================================

/// Growing from 2 to 5 members submits all three creates before polling any.
#[tokio::test(start_paused = true)]
async fn test_scale_out_submits_all_creates_first() {
    let h = Harness::seeded(flat(2)).await;

    let outcome = h.reconciler.reconcile(&flat(2), &flat(5), None).await.unwrap();
    assert_eq!(outcome.added, vec!["cache-003", "cache-004", "cache-005"]);

    let calls = h.calls().await;
    let creates: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            Call::CreateMember(id) => Some(id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(creates, vec!["cache-003", "cache-004", "cache-005"]);

    let last_create = last_index(&calls, |c| c.operation() == Operation::CreateMember).unwrap();
    let first_poll = first_index(&calls, |c| c.operation() == Operation::DescribeMember).unwrap();
    assert!(last_create < first_poll);

    let topology = h.sim.topology(GROUP).await.unwrap();
    assert_eq!(topology.member_count, 5);
}

/// Members are polled in submission order.
#[tokio::test(start_paused = true)]
async fn test_scale_out_polls_in_submission_order() {
    let h = Harness::seeded(flat(1)).await;
    h.reconciler.reconcile(&flat(1), &flat(3), None).await.unwrap();

    let polled: Vec<_> = h
        .calls()
        .await
        .into_iter()
        .filter_map(|c| match c {
            Call::DescribeMember(id) => Some(id),
            _ => None,
        })
        .collect();
    let first_002 = polled.iter().position(|id| id == "cache-002").unwrap();
    let first_003 = polled.iter().position(|id| id == "cache-003").unwrap();
    assert!(first_002 < first_003);
}

/// A rejected create aborts the batch and names the already-submitted members.
#[tokio::test(start_paused = true)]
async fn test_scale_out_partial_provisioning() {
    let h = Harness::seeded(flat(2)).await;
    h.sim
        .inject_fault(
            Operation::CreateMember,
            Some("cache-004"),
            ControlPlaneError::Rejected("cluster quota exceeded".to_string()),
            1,
        )
        .await;

    let err = h
        .reconciler
        .reconcile(&flat(2), &flat(5), None)
        .await
        .unwrap_err();

    match &err {
        Error::PartialProvisioning { id, submitted, .. } => {
            assert_eq!(id, "cache-004");
            assert_eq!(submitted, &vec!["cache-003".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.resource_id(), Some("cache-004"));
    assert_eq!(err.phase(), Some(Phase::Submit));
    // The submitted member is left creating, not rolled back.
    assert!(h.sim.member("cache-003").await.is_some());
    assert!(h.sim.member("cache-005").await.is_none());
}

// ============================================================================
// Scale In
// ============================================================================

/// Removing the primary with failover on: reassign, delete, restore failover.
#[tokio::test(start_paused = true)]
async fn test_remove_primary_with_failover() {
    let old = flat(3).with_automatic_failover(true);
    let new = flat(2).with_automatic_failover(true);
    let h = Harness::seeded(old.clone()).await;
    h.sim.set_primary("cache-003").await;

    let outcome = h.reconciler.reconcile(&old, &new, None).await.unwrap();

    assert_eq!(outcome.decommission.removed, vec!["cache-003"]);
    assert_eq!(
        outcome.decommission.reassignments,
        vec![PrimaryReassignment {
            removed: "cache-003".to_string(),
            new_primary: "cache-001".to_string(),
        }]
    );
    assert!(outcome.decommission.failover_suspended);
    assert!(outcome.decommission.failover_restored);
    assert!(outcome.change.is_none());

    assert_eq!(
        h.mutation_ops().await,
        vec![
            Operation::DeleteMember,   // refused, serving as primary
            Operation::ModifyTopology, // failover off
            Operation::ModifyTopology, // new primary
            Operation::DeleteMember,   // retried
            Operation::ModifyTopology, // failover back on
        ]
    );
    assert_eq!(h.failover_toggles().await, vec![false, true]);

    let topology = h.sim.topology(GROUP).await.unwrap();
    assert_eq!(topology.member_count, 2);
    assert_eq!(topology.member_clusters, vec!["cache-001", "cache-002"]);
    assert_eq!(topology.primary_member.as_deref(), Some("cache-001"));
    assert!(topology.automatic_failover_enabled);
}

/// An unrelated delete failure aborts immediately without reassignment.
#[tokio::test(start_paused = true)]
async fn test_scale_in_aborts_on_unrelated_delete_failure() {
    let h = Harness::seeded(flat(3)).await;
    h.sim
        .inject_fault(
            Operation::DeleteMember,
            Some("cache-003"),
            ControlPlaneError::Rejected("snapshot in progress for member".to_string()),
            1,
        )
        .await;

    let err = h
        .reconciler
        .reconcile(&flat(3), &flat(1), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::NonRetryable { ref id, phase: Phase::Submit, .. } if id == "cache-003"
    ));
    assert!(err.to_string().contains("cache-003"));
    assert_eq!(h.deletes().await, vec!["cache-003"]);
    assert_eq!(h.count(Operation::ModifyTopology).await, 0);
    assert_eq!(h.count(Operation::DescribeTopology).await, 0);
}

/// Members already removed stay removed when a later delete fails.
#[tokio::test(start_paused = true)]
async fn test_scale_in_keeps_earlier_removals() {
    let h = Harness::seeded(flat(4)).await;
    h.sim
        .inject_fault(
            Operation::DeleteMember,
            Some("cache-003"),
            ControlPlaneError::Transport("connection reset".to_string()),
            1,
        )
        .await;

    let err = h
        .reconciler
        .reconcile(&flat(4), &flat(2), None)
        .await
        .unwrap_err();
    assert_eq!(err.resource_id(), Some("cache-003"));
    // Deletion of cache-004 was accepted before the failure.
    assert_eq!(h.deletes().await, vec!["cache-004", "cache-003"]);
}

// ============================================================================
// Busy Groups and Attribute Changes
// ============================================================================

/// A modify against a busy group is retried until the group settles.
#[tokio::test(start_paused = true)]
async fn test_attribute_change_waits_out_busy_group() {
    let h = Harness::seeded(flat(2)).await;
    h.sim.set_topology_status(GROUP, TopologyStatus::Snapshotting).await;

    let sim = h.sim.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        sim.set_topology_status(GROUP, TopologyStatus::Available).await;
    });

    let new = flat(2).with_settings(GroupSettings {
        engine_version: Some("7.1".to_string()),
        ..Default::default()
    });
    let start = Instant::now();
    let outcome = h.reconciler.reconcile(&flat(2), &new, None).await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(4 * 60));
    assert_eq!(
        outcome.change.and_then(|c| c.engine_version).as_deref(),
        Some("7.1")
    );
    assert!(h.count(Operation::ModifyTopology).await > 1);
    assert_eq!(
        h.sim.topology(GROUP).await.unwrap().settings.engine_version.as_deref(),
        Some("7.1")
    );
}

/// Past the retry budget the modify is attempted once more and its error surfaces.
#[tokio::test(start_paused = true)]
async fn test_attribute_change_budget_exhausted() {
    let h = Harness::seeded(flat(2)).await;
    h.sim.set_topology_status(GROUP, TopologyStatus::Modifying).await;

    let new = flat(2).with_settings(GroupSettings {
        description: "never applied".to_string(),
        ..Default::default()
    });
    let start = Instant::now();
    let err = h.reconciler.reconcile(&flat(2), &new, None).await.unwrap_err();

    // Five minute budget, then one final attempt.
    assert_eq!(start.elapsed(), Duration::from_secs(5 * 60));
    assert!(matches!(
        err,
        Error::NonRetryable {
            source: ControlPlaneError::InvalidState {
                kind: ResourceKind::ReplicationGroup,
                ..
            },
            ..
        }
    ));
}

/// Enabling snapshots names the first member as the snapshotting cluster.
#[tokio::test(start_paused = true)]
async fn test_enabling_snapshot_retention() {
    let h = Harness::seeded(flat(2)).await;
    let new = flat(2).with_settings(GroupSettings {
        snapshot_retention_limit: 5,
        snapshot_window: Some("05:00-09:00".to_string()),
        ..Default::default()
    });

    let outcome = h.reconciler.reconcile(&flat(2), &new, None).await.unwrap();
    let change = outcome.change.unwrap();
    assert_eq!(change.snapshotting_cluster_id.as_deref(), Some("cache-001"));
    assert_eq!(change.snapshot_retention_limit, Some(5));
}

/// A mixed-case group id names the snapshotting member by its normalized id.
#[tokio::test(start_paused = true)]
async fn test_snapshotting_member_uses_normalized_id() {
    let h = Harness::seeded(flat(2)).await;
    let old = Topology::flat("Cache", 2);
    let new = Topology::flat("Cache", 3).with_settings(GroupSettings {
        snapshot_retention_limit: 5,
        ..Default::default()
    });

    let outcome = h.reconciler.reconcile(&old, &new, None).await.unwrap();
    assert_eq!(outcome.replication_group_id, GROUP);
    assert_eq!(outcome.added, vec!["cache-003"]);

    let change = outcome.change.unwrap();
    assert_eq!(change.replication_group_id, GROUP);
    assert_eq!(change.snapshotting_cluster_id.as_deref(), Some("cache-001"));

    let submitted: Vec<_> = h
        .calls()
        .await
        .into_iter()
        .filter_map(|c| match c {
            Call::ModifyTopology(change) => change.snapshotting_cluster_id,
            _ => None,
        })
        .collect();
    assert_eq!(submitted, vec!["cache-001"]);
    assert_eq!(
        h.sim.topology(GROUP).await.unwrap().settings.snapshot_retention_limit,
        5
    );
}

/// Metrics are recorded per replication group.
#[tokio::test(start_paused = true)]
async fn test_reconcile_records_metrics() {
    let h = Harness::seeded(flat(3)).await;
    h.reconciler.reconcile(&flat(3), &flat(2), None).await.unwrap();
    h.reconciler
        .reconcile(&flat(2), &flat(1), Some("cache-final"))
        .await
        .unwrap();
    h.sim
        .inject_fault(
            Operation::ModifyTopology,
            None,
            ControlPlaneError::Throttled("rate exceeded".to_string()),
            1,
        )
        .await;
    let renamed = flat(1).with_settings(GroupSettings {
        description: "renamed".to_string(),
        ..Default::default()
    });
    assert!(h.reconciler.reconcile(&flat(1), &renamed, None).await.is_err());

    let encoded = h.metrics.encode();
    assert!(encoded.contains("rgr_members_removed_total{replication_group=\"cache\"} 2"));
    assert!(encoded.contains("rgr_reconciliations_total{replication_group=\"cache\"} 2"));
    assert!(encoded.contains("rgr_reconciliation_errors_total{replication_group=\"cache\"} 1"));
}
