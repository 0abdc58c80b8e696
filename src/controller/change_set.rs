//! Declarative diff of general replication group attributes.
//!
//! The diff produces one immutable [`TopologyChange`] that is handed to a single
//! modify call, instead of patching a request field by field while it is sent.

use crate::client::{Topology, TopologyChange};

use super::member_plan::member_id;

impl TopologyChange {
    /// Change that only toggles automatic failover.
    pub fn failover(replication_group_id: &str, enabled: bool) -> Self {
        Self {
            replication_group_id: replication_group_id.to_string(),
            apply_immediately: true,
            automatic_failover_enabled: Some(enabled),
            ..Default::default()
        }
    }

    /// Change that only promotes `cluster_id` to primary.
    pub fn primary(replication_group_id: &str, cluster_id: &str) -> Self {
        Self {
            replication_group_id: replication_group_id.to_string(),
            apply_immediately: true,
            primary_cluster_id: Some(cluster_id.to_string()),
            ..Default::default()
        }
    }

    /// Whether any attribute is set besides the group id and apply flag.
    pub fn has_changes(&self) -> bool {
        let empty = TopologyChange {
            replication_group_id: self.replication_group_id.clone(),
            apply_immediately: self.apply_immediately,
            ..Default::default()
        };
        *self != empty
    }
}

fn changed<T: PartialEq + Clone>(old: &T, new: &T) -> Option<T> {
    (old != new).then(|| new.clone())
}

/// Compute the general attribute change between `old` and `new`.
///
/// Returns `None` when nothing needs to be modified. Member and shard counts
/// are handled elsewhere and never appear in the change.
pub fn plan_modification(old: &Topology, new: &Topology) -> Option<TopologyChange> {
    let (o, n) = (&old.settings, &new.settings);
    let id = &new.replication_group_id;

    let snapshot_retention_limit = changed(&o.snapshot_retention_limit, &n.snapshot_retention_limit);
    // Enabling snapshots needs a member to take them; the first member always exists.
    let snapshotting_cluster_id = (snapshot_retention_limit.is_some()
        && o.snapshot_retention_limit == 0)
        .then(|| member_id(id, 1));

    let change = TopologyChange {
        replication_group_id: id.clone(),
        apply_immediately: n.apply_immediately,
        description: changed(&o.description, &n.description),
        automatic_failover_enabled: changed(
            &old.automatic_failover_enabled,
            &new.automatic_failover_enabled,
        ),
        primary_cluster_id: None,
        auto_minor_version_upgrade: changed(
            &o.auto_minor_version_upgrade,
            &n.auto_minor_version_upgrade,
        ),
        node_type: changed(&o.node_type, &n.node_type).flatten(),
        engine_version: changed(&o.engine_version, &n.engine_version).flatten(),
        parameter_group_name: changed(&o.parameter_group_name, &n.parameter_group_name).flatten(),
        maintenance_window: changed(&o.maintenance_window, &n.maintenance_window).flatten(),
        notification_topic_arn: changed(&o.notification_topic_arn, &n.notification_topic_arn)
            .flatten(),
        // An empty list cannot be sent; clearing security groups is not supported.
        security_group_ids: changed(&o.security_group_ids, &n.security_group_ids)
            .filter(|ids| !ids.is_empty()),
        snapshot_retention_limit,
        snapshotting_cluster_id,
        snapshot_window: changed(&o.snapshot_window, &n.snapshot_window).flatten(),
    };

    change.has_changes().then_some(change)
}
