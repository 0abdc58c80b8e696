//! Adding members to a replication group and creating new groups.
//!
//! Member creation is a fan-out/fan-in: every create is submitted first, each
//! one acknowledged before the next, and only then is each new member polled to
//! `available` in submission order.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::context::Context;
use super::error::{Error, Phase, Result};
use super::retry::retry_mutation;
use super::validation::{normalize_replication_group_id, validate_blueprint};
use super::waiter::{wait_for_member_available, wait_for_topology_available};
use crate::client::{
    ControlPlane, CreateMemberRequest, CreateTopologyRequest, GroupSettings, Member,
    NodeGroupConfiguration, Topology,
};

/// Create every member in `to_add` and wait for all of them to be available.
///
/// A rejected submission aborts with [`Error::PartialProvisioning`]; members
/// submitted before it are left creating and are not polled.
#[instrument(skip(ctx, to_add), fields(replication_group_id = %ctx.replication_group_id))]
pub async fn provision<C: ControlPlane>(ctx: &Context<C>, to_add: &[String]) -> Result<Vec<Member>> {
    if to_add.is_empty() {
        return Ok(Vec::new());
    }

    let group = ctx.replication_group_id.as_str();
    let mut submitted: Vec<String> = Vec::with_capacity(to_add.len());
    for cluster_id in to_add {
        let request = CreateMemberRequest {
            cluster_id: cluster_id.clone(),
            replication_group_id: group.to_string(),
        };
        let (control_plane, request) = (ctx.control_plane.as_ref(), &request);
        let result = retry_mutation(ctx, cluster_id, ctx.config.member_budget(), move || {
            control_plane.create_member(request)
        })
        .await?;

        if let Err(source) = result {
            return Err(Error::PartialProvisioning {
                id: cluster_id.clone(),
                submitted,
                source,
            });
        }
        info!(cluster_id = %cluster_id, "Submitted member creation");
        submitted.push(cluster_id.clone());
    }

    let mut members = Vec::with_capacity(submitted.len());
    for cluster_id in &submitted {
        members.push(wait_for_member_available(ctx, cluster_id, ctx.config.update_timeout).await?);
    }

    info!(count = members.len(), "Members available");
    ctx.record(|m, group| m.record_members_added(group, members.len() as u64));
    Ok(members)
}

/// Member layout of a new replication group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GroupLayout {
    /// A single node group with `member_count` members.
    Flat { member_count: u32 },
    /// `shard_count` node groups, each with a primary and `replicas_per_shard` replicas.
    Sharded {
        shard_count: u32,
        replicas_per_shard: u32,
    },
}

/// Slot layout for restoring a sharded group from snapshots.
///
/// Every slot range becomes one node group placed in the same availability zones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeGroupLayout {
    pub slots: Vec<String>,
    pub primary_availability_zone: Option<String>,
    pub replica_availability_zones: Vec<String>,
}

impl NodeGroupLayout {
    /// One node group configuration per slot range.
    pub fn expand(&self) -> Vec<NodeGroupConfiguration> {
        self.slots
            .iter()
            .map(|slots| NodeGroupConfiguration {
                slots: slots.clone(),
                primary_availability_zone: self.primary_availability_zone.clone(),
                replica_availability_zones: self.replica_availability_zones.clone(),
            })
            .collect()
    }
}

/// Desired shape of a replication group that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBlueprint {
    pub replication_group_id: String,
    pub layout: GroupLayout,
    #[serde(default)]
    pub automatic_failover_enabled: bool,
    /// Snapshots to seed the new group from.
    #[serde(default)]
    pub snapshot_arns: Vec<String>,
    #[serde(default)]
    pub node_group_layout: Option<NodeGroupLayout>,
    #[serde(default)]
    pub settings: GroupSettings,
}

impl GroupBlueprint {
    /// Blueprint for a flat group with `member_count` members.
    pub fn flat(replication_group_id: impl Into<String>, member_count: u32) -> Self {
        Self {
            replication_group_id: replication_group_id.into(),
            layout: GroupLayout::Flat { member_count },
            automatic_failover_enabled: false,
            snapshot_arns: Vec::new(),
            node_group_layout: None,
            settings: GroupSettings::default(),
        }
    }

    /// Blueprint for a sharded group.
    pub fn sharded(
        replication_group_id: impl Into<String>,
        shard_count: u32,
        replicas_per_shard: u32,
    ) -> Self {
        Self {
            layout: GroupLayout::Sharded {
                shard_count,
                replicas_per_shard,
            },
            ..Self::flat(replication_group_id, 1)
        }
    }

    /// Build the create request. Node group configuration is only sent when
    /// restoring from snapshots.
    pub fn to_request(&self) -> Result<CreateTopologyRequest> {
        let replication_group_id = normalize_replication_group_id(&self.replication_group_id)?;
        let (member_count, shard_count, replicas_per_shard) = match self.layout {
            GroupLayout::Flat { member_count } => (Some(member_count), None, None),
            GroupLayout::Sharded {
                shard_count,
                replicas_per_shard,
            } => (None, Some(shard_count), Some(replicas_per_shard)),
        };
        let node_group_configuration = if self.snapshot_arns.is_empty() {
            Vec::new()
        } else {
            self.node_group_layout
                .as_ref()
                .map(NodeGroupLayout::expand)
                .unwrap_or_default()
        };

        Ok(CreateTopologyRequest {
            replication_group_id,
            member_count,
            shard_count,
            replicas_per_shard,
            automatic_failover_enabled: self.automatic_failover_enabled,
            snapshot_arns: self.snapshot_arns.clone(),
            node_group_configuration,
            settings: self.settings.clone(),
        })
    }
}

/// Create a replication group from `blueprint` and wait for it to be available.
///
/// The create call itself is not retried.
#[instrument(skip(ctx, blueprint), fields(replication_group_id = %blueprint.replication_group_id))]
pub async fn provision_group<C: ControlPlane>(
    ctx: &Context<C>,
    blueprint: &GroupBlueprint,
) -> Result<Topology> {
    validate_blueprint(blueprint)?;
    let request = blueprint.to_request()?;
    let id = request.replication_group_id.as_str();

    ctx.ensure_active(id, Phase::Submit)?;
    ctx.control_plane
        .create_topology(&request)
        .await
        .map_err(|source| Error::submit("create replication group", id, source))?;
    info!(
        replication_group_id = %id,
        restore = !request.snapshot_arns.is_empty(),
        "Submitted replication group creation"
    );

    wait_for_topology_available(ctx, id, ctx.config.create_timeout).await
}
