//! Removing members from a replication group.
//!
//! Deletes are submitted for every member first and deletion is awaited
//! afterwards. A member that is serving as primary cannot be deleted, so the
//! primary is first moved to a member that survives the batch. Promoting a
//! primary is refused while automatic failover is enabled; failover is switched
//! off for the reassignment and switched back on once, after the whole batch.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::context::Context;
use super::error::{Error, Phase, Result};
use super::retry::retry_mutation;
use super::waiter::{wait_for_member_deleted, wait_for_topology_available};
use crate::client::{ControlPlane, ControlPlaneError, ErrorClass, TopologyChange};

/// Where the removal of one member stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalState {
    /// Delete submitted, or about to be
    Requested,
    /// Delete refused because the member is the primary
    PrimaryConflict,
    /// Moving the primary to a surviving member
    Reassigning,
    /// Delete resubmitted after reassignment
    Retried,
    /// Member is gone
    Done,
    /// Removal aborted; the member may still exist
    Failed,
}

impl fmt::Display for RemovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalState::Requested => write!(f, "Requested"),
            RemovalState::PrimaryConflict => write!(f, "PrimaryConflict"),
            RemovalState::Reassigning => write!(f, "Reassigning"),
            RemovalState::Retried => write!(f, "Retried"),
            RemovalState::Done => write!(f, "Done"),
            RemovalState::Failed => write!(f, "Failed"),
        }
    }
}

impl RemovalState {
    /// Whether `next` may follow this state.
    pub fn can_transition_to(self, next: RemovalState) -> bool {
        use RemovalState::*;
        matches!(
            (self, next),
            (Requested, PrimaryConflict | Done | Failed)
                | (PrimaryConflict, Reassigning | Failed)
                | (Reassigning, Retried | Failed)
                | (Retried, Done | Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RemovalState::Done | RemovalState::Failed)
    }
}

/// A primary moved away from a member before deleting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryReassignment {
    pub removed: String,
    pub new_primary: String,
}

/// Result of a completed removal batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecommissionReport {
    /// Removed members, in removal order.
    pub removed: Vec<String>,
    pub reassignments: Vec<PrimaryReassignment>,
    /// Automatic failover was switched off during the batch.
    pub failover_suspended: bool,
    /// Automatic failover was switched back on at the end of the batch.
    pub failover_restored: bool,
}

/// Removes a batch of members from the context's replication group.
pub struct Decommissioner<'a, C> {
    ctx: &'a Context<C>,
    to_remove: &'a [String],
    final_snapshot_id: Option<&'a str>,
    /// Re-enable failover at the end if it had to be switched off.
    restore_failover: bool,
    failover_suspended: bool,
    states: BTreeMap<String, RemovalState>,
    reassignments: Vec<PrimaryReassignment>,
}

impl<'a, C: ControlPlane> Decommissioner<'a, C> {
    pub fn new(
        ctx: &'a Context<C>,
        to_remove: &'a [String],
        final_snapshot_id: Option<&'a str>,
        restore_failover: bool,
    ) -> Self {
        Self {
            ctx,
            to_remove,
            final_snapshot_id,
            restore_failover,
            failover_suspended: false,
            states: BTreeMap::new(),
            reassignments: Vec::new(),
        }
    }

    /// Current state of every member seen so far.
    pub fn states(&self) -> &BTreeMap<String, RemovalState> {
        &self.states
    }

    /// Remove every member and restore failover if it was suspended.
    ///
    /// Any failure other than a primary conflict aborts the batch. Members
    /// already removed stay removed. If failover was suspended, one attempt is
    /// made to switch it back on before the error is returned, unless the
    /// caller cancelled.
    #[instrument(
        skip(self),
        fields(replication_group_id = %self.ctx.replication_group_id, count = self.to_remove.len())
    )]
    pub async fn run(mut self) -> Result<DecommissionReport> {
        if self.to_remove.is_empty() {
            return Ok(DecommissionReport::default());
        }

        if let Err(err) = self.remove_all().await {
            if self.needs_restore() && !matches!(err, Error::Cancelled { .. }) {
                warn!(error = %err, "Removal failed, restoring automatic failover");
                if let Err(restore_err) = self.restore_failover().await {
                    warn!(error = %restore_err, "Failed to restore automatic failover");
                }
            }
            return Err(err);
        }

        let failover_suspended = self.failover_suspended;
        let failover_restored = if self.needs_restore() {
            self.restore_failover().await?;
            true
        } else {
            false
        };

        let count = self.to_remove.len() as u64;
        self.ctx.record(|m, group| m.record_members_removed(group, count));
        info!(removed = count, failover_restored, "Members removed");

        Ok(DecommissionReport {
            removed: self.to_remove.to_vec(),
            reassignments: self.reassignments,
            failover_suspended,
            failover_restored,
        })
    }

    fn needs_restore(&self) -> bool {
        self.failover_suspended && self.restore_failover
    }

    async fn remove_all(&mut self) -> Result<()> {
        let to_remove = self.to_remove;
        for cluster_id in to_remove {
            self.states.insert(cluster_id.clone(), RemovalState::Requested);
            if let Err(err) = self.submit(cluster_id).await {
                self.transition(cluster_id, RemovalState::Failed);
                return Err(err);
            }
        }

        for cluster_id in to_remove {
            if let Err(err) =
                wait_for_member_deleted(self.ctx, cluster_id, self.ctx.config.update_timeout).await
            {
                self.transition(cluster_id, RemovalState::Failed);
                return Err(err);
            }
            self.transition(cluster_id, RemovalState::Done);
        }
        Ok(())
    }

    async fn submit(&mut self, cluster_id: &str) -> Result<()> {
        match self.delete(cluster_id).await? {
            Ok(()) => {
                info!(cluster_id, "Submitted member deletion");
                Ok(())
            }
            Err(source) if source.classify() == ErrorClass::PrimaryConflict => {
                info!(cluster_id, "Member is serving as primary, reassigning");
                self.transition(cluster_id, RemovalState::PrimaryConflict);
                self.reassign_primary(cluster_id).await?;

                self.transition(cluster_id, RemovalState::Retried);
                self.delete(cluster_id)
                    .await?
                    .map_err(|source| Error::NonRetryable {
                        operation: "delete member",
                        id: cluster_id.to_string(),
                        phase: Phase::Reassignment,
                        source,
                    })?;
                info!(cluster_id, "Submitted member deletion after reassignment");
                Ok(())
            }
            Err(source) => Err(Error::submit("delete member", cluster_id, source)),
        }
    }

    async fn delete(
        &self,
        cluster_id: &str,
    ) -> Result<std::result::Result<(), ControlPlaneError>> {
        let control_plane = self.ctx.control_plane.as_ref();
        let final_snapshot_id = self.final_snapshot_id;
        retry_mutation(self.ctx, cluster_id, self.ctx.config.member_budget(), move || {
            control_plane.delete_member(cluster_id, final_snapshot_id)
        })
        .await
    }

    async fn reassign_primary(&mut self, cluster_id: &str) -> Result<()> {
        self.transition(cluster_id, RemovalState::Reassigning);
        let group = self.ctx.replication_group_id.as_str();

        self.ctx.ensure_active(group, Phase::Reassignment)?;
        let topology = self
            .ctx
            .control_plane
            .describe_topology(group)
            .await
            .map_err(|source| Error::NonRetryable {
                operation: "describe replication group",
                id: group.to_string(),
                phase: Phase::Reassignment,
                source,
            })?;

        let new_primary = topology
            .member_clusters
            .iter()
            .find(|member| !self.to_remove.contains(member))
            .cloned()
            .ok_or_else(|| Error::NoEligiblePrimary {
                replication_group_id: group.to_string(),
                id: cluster_id.to_string(),
            })?;
        info!(
            cluster_id,
            current_primary = ?topology.primary_member,
            %new_primary,
            "Selected new primary"
        );

        if topology.automatic_failover_enabled {
            self.modify(TopologyChange::failover(group, false), Phase::Reassignment)
                .await?;
            self.failover_suspended = true;
            info!("Suspended automatic failover");
            wait_for_topology_available(self.ctx, group, self.ctx.config.update_timeout).await?;
        }

        self.modify(TopologyChange::primary(group, &new_primary), Phase::Reassignment)
            .await?;
        wait_for_topology_available(self.ctx, group, self.ctx.config.update_timeout).await?;

        self.ctx.record(|m, group| m.record_primary_reassignment(group));
        self.reassignments.push(PrimaryReassignment {
            removed: cluster_id.to_string(),
            new_primary,
        });
        Ok(())
    }

    async fn restore_failover(&mut self) -> Result<()> {
        let group = self.ctx.replication_group_id.as_str();
        self.modify(TopologyChange::failover(group, true), Phase::Restore)
            .await?;
        self.failover_suspended = false;
        info!("Restored automatic failover");
        wait_for_topology_available(self.ctx, group, self.ctx.config.update_timeout).await?;
        Ok(())
    }

    async fn modify(&self, change: TopologyChange, phase: Phase) -> Result<()> {
        let control_plane = self.ctx.control_plane.as_ref();
        let group = change.replication_group_id.as_str();
        let change = &change;
        retry_mutation(self.ctx, group, self.ctx.config.member_budget(), move || {
            control_plane.modify_topology(change)
        })
        .await?
        .map_err(|source| Error::NonRetryable {
            operation: "modify replication group",
            id: group.to_string(),
            phase,
            source,
        })
    }

    fn transition(&mut self, cluster_id: &str, next: RemovalState) {
        let current = self
            .states
            .get(cluster_id)
            .copied()
            .unwrap_or(RemovalState::Requested);
        if !current.can_transition_to(next) {
            warn!(cluster_id, from = %current, to = %next, "Unexpected removal state transition");
        }
        debug!(cluster_id, from = %current, to = %next, "Removal state transition");
        self.states.insert(cluster_id.to_string(), next);
    }
}

/// Remove `to_remove` from the context's replication group.
///
/// `restore_failover` is whether the desired topology wants automatic
/// failover enabled.
pub async fn decommission<C: ControlPlane>(
    ctx: &Context<C>,
    to_remove: &[String],
    final_snapshot_id: Option<&str>,
    restore_failover: bool,
) -> Result<DecommissionReport> {
    Decommissioner::new(ctx, to_remove, final_snapshot_id, restore_failover)
        .run()
        .await
}
