//! Changing the number of node groups of a sharded replication group.

use serde::Serialize;
use tracing::{info, instrument};

use super::context::Context;
use super::error::{Error, Result};
use super::member_plan::node_groups_to_remove;
use super::retry::retry_mutation;
use super::waiter::wait_for_topology_available;
use crate::client::{ControlPlane, ShardConfigurationRequest};

/// A completed node group count change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardResize {
    pub from: u32,
    pub to: u32,
    /// Node groups removed, highest first. Empty when growing.
    pub removed: Vec<String>,
}

/// Build the shard configuration request for going from `old_count` to
/// `new_count` node groups.
pub fn shard_request(replication_group_id: &str, old_count: u32, new_count: u32) -> ShardConfigurationRequest {
    ShardConfigurationRequest {
        replication_group_id: replication_group_id.to_string(),
        node_group_count: new_count,
        node_groups_to_remove: node_groups_to_remove(old_count, new_count),
        apply_immediately: true,
    }
}

/// Resize the context's replication group from `old_count` to `new_count`
/// node groups and wait for it to be available again.
///
/// Returns `None` when the counts are equal.
#[instrument(skip(ctx), fields(replication_group_id = %ctx.replication_group_id))]
pub async fn resize_shards<C: ControlPlane>(
    ctx: &Context<C>,
    old_count: u32,
    new_count: u32,
) -> Result<Option<ShardResize>> {
    if old_count == new_count {
        return Ok(None);
    }

    let group = ctx.replication_group_id.as_str();
    let request = shard_request(group, old_count, new_count);
    let (control_plane, request_ref) = (ctx.control_plane.as_ref(), &request);
    retry_mutation(ctx, group, ctx.config.member_budget(), move || {
        control_plane.modify_shard_configuration(request_ref)
    })
    .await?
    .map_err(|source| Error::submit("modify shard configuration", group, source))?;
    info!(
        from = old_count,
        to = new_count,
        removed = ?request.node_groups_to_remove,
        "Submitted shard configuration change"
    );

    wait_for_topology_available(ctx, group, ctx.config.update_timeout).await?;
    Ok(Some(ShardResize {
        from: old_count,
        to: new_count,
        removed: request.node_groups_to_remove,
    }))
}
