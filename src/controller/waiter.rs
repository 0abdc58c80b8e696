//! Blocking waits for remote resources to reach a status.
//!
//! [`await_status`] is generic over the resource's status vocabulary, so the
//! same loop serves replication group and member waits. The helpers below bind
//! it to the concrete describe calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::context::Context;
use super::error::{Error, Phase, Result};
use crate::client::{
    ControlPlane, ControlPlaneError, Member, MemberStatus, Observed, ResourceKind,
    ResourceStatus, Topology, TopologyStatus,
};

/// What a wait is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget<S> {
    /// The resource must report this status. Disappearing is an error.
    Status(S),
    /// The resource must report this status or disappear.
    Deletion(S),
}

impl<S: ResourceStatus> WaitTarget<S> {
    pub fn status(&self) -> S {
        match self {
            WaitTarget::Status(s) | WaitTarget::Deletion(s) => *s,
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self, WaitTarget::Deletion(_))
    }
}

fn describe_operation(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::ReplicationGroup => "describe replication group",
        ResourceKind::Member => "describe member",
    }
}

/// Poll `describe` until the resource reaches `target`.
///
/// Returns the last observed state, or `None` when a deletion target was met
/// by the resource disappearing. Throttling, transport errors and busy
/// responses are logged and polled through; other describe errors are fatal.
/// The timeout is clamped to the context deadline and every sleep is
/// cancellable.
#[instrument(skip(ctx, describe))]
pub async fn await_status<C, T, F, Fut>(
    ctx: &Context<C>,
    id: &str,
    target: WaitTarget<T::Status>,
    timeout: Duration,
    mut describe: F,
) -> Result<Option<T>>
where
    T: Observed,
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ControlPlaneError>>,
{
    let kind = <T::Status as ResourceStatus>::KIND;
    let timeout = ctx.bounded(timeout);
    let start = Instant::now();

    loop {
        ctx.ensure_active(id, Phase::Poll)?;

        match describe().await {
            Ok(observed) => {
                let status = observed.status();
                if status == target.status() {
                    info!(%kind, id, %status, "Target status reached");
                    return Ok(Some(observed));
                }
                if status.is_terminal_failure() {
                    return Err(Error::TerminalState {
                        kind,
                        id: id.to_string(),
                        status: status.to_string(),
                        phase: Phase::Poll,
                    });
                }
                debug!(%kind, id, %status, target = %target.status(), "Not yet at target status");
            }
            Err(e) if e.is_not_found() => {
                if target.is_deletion() {
                    info!(%kind, id, "Resource no longer exists");
                    return Ok(None);
                }
                return Err(Error::NotFound {
                    kind,
                    id: id.to_string(),
                    phase: Phase::Poll,
                });
            }
            Err(e) if e.is_retryable_read() => {
                warn!(%kind, id, error = %e, "Error describing resource, will retry");
            }
            Err(source) => {
                return Err(Error::NonRetryable {
                    operation: describe_operation(kind),
                    id: id.to_string(),
                    phase: Phase::Poll,
                    source,
                });
            }
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(Error::Timeout {
                kind,
                id: id.to_string(),
                target: target.status().to_string(),
                waited: elapsed,
            });
        }
        let nap = ctx.config.poll_interval.min(timeout - elapsed);
        ctx.pause(nap, id, Phase::Poll).await?;
    }
}

/// Wait for a replication group to report `available`.
pub async fn wait_for_topology_available<C: ControlPlane>(
    ctx: &Context<C>,
    replication_group_id: &str,
    timeout: Duration,
) -> Result<Topology> {
    let control_plane = ctx.control_plane.as_ref();
    await_status(
        ctx,
        replication_group_id,
        WaitTarget::Status(TopologyStatus::Available),
        timeout,
        move || control_plane.describe_topology(replication_group_id),
    )
    .await?
    .ok_or_else(|| Error::NotFound {
        kind: ResourceKind::ReplicationGroup,
        id: replication_group_id.to_string(),
        phase: Phase::Poll,
    })
}

/// Wait for a replication group to be deleted.
pub async fn wait_for_topology_deleted<C: ControlPlane>(
    ctx: &Context<C>,
    replication_group_id: &str,
    timeout: Duration,
) -> Result<()> {
    let control_plane = ctx.control_plane.as_ref();
    await_status(
        ctx,
        replication_group_id,
        WaitTarget::Deletion(TopologyStatus::Deleted),
        timeout,
        move || control_plane.describe_topology(replication_group_id),
    )
    .await?;
    Ok(())
}

/// Wait for a member to report `available`.
pub async fn wait_for_member_available<C: ControlPlane>(
    ctx: &Context<C>,
    cluster_id: &str,
    timeout: Duration,
) -> Result<Member> {
    let control_plane = ctx.control_plane.as_ref();
    await_status(
        ctx,
        cluster_id,
        WaitTarget::Status(MemberStatus::Available),
        timeout,
        move || control_plane.describe_member(cluster_id),
    )
    .await?
    .ok_or_else(|| Error::NotFound {
        kind: ResourceKind::Member,
        id: cluster_id.to_string(),
        phase: Phase::Poll,
    })
}

/// Wait for a member to be deleted.
pub async fn wait_for_member_deleted<C: ControlPlane>(
    ctx: &Context<C>,
    cluster_id: &str,
    timeout: Duration,
) -> Result<()> {
    let control_plane = ctx.control_plane.as_ref();
    await_status(
        ctx,
        cluster_id,
        WaitTarget::Deletion(MemberStatus::Deleted),
        timeout,
        move || control_plane.describe_member(cluster_id),
    )
    .await?;
    Ok(())
}
