//! Reconciliation of a replication group towards a desired topology.
//!
//! A reconciliation runs its steps strictly in order and waits for the group
//! to settle after each one:
//!
//! 1. node group count (sharded groups)
//! 2. member count, adding or removing members
//! 3. general attributes, in one modify call
//!
//! Nothing is rolled back on failure. Callers re-read the group with
//! [`Reconciler::observe`] and reconcile again from what they find.

use std::sync::Arc;
use std::time::Duration;

use jiff::Timestamp;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument};
use uuid::Uuid;

use super::change_set::plan_modification;
use super::config::ReconcilerConfig;
use super::context::Context;
use super::decommissioner::{DecommissionReport, decommission};
use super::error::{Error, Phase, Result};
use super::member_plan::diff_members;
use super::provisioner::{GroupBlueprint, provision, provision_group};
use super::retry::retry_mutation;
use super::shard_resizer::{ShardResize, resize_shards};
use super::validation::{normalize_replication_group_id, validate_reconcile};
use super::waiter::{wait_for_topology_available, wait_for_topology_deleted};
use crate::client::{ControlPlane, ResourceKind, Topology, TopologyChange};
use crate::metrics::Metrics;

/// Caller controls for a single reconciliation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stops all waiting when cancelled. Submitted operations keep running.
    pub cancel: Option<CancellationToken>,
    /// Overall deadline for every wait and retry.
    pub timeout: Option<Duration>,
}

impl RunOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Summary of a successful reconciliation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub reconcile_id: Uuid,
    pub replication_group_id: String,
    pub shard_resize: Option<ShardResize>,
    /// Members created, in creation order.
    pub added: Vec<String>,
    pub decommission: DecommissionReport,
    /// General attribute change applied, if any.
    pub change: Option<TopologyChange>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl ReconcileOutcome {
    /// Whether anything was changed remotely.
    pub fn is_noop(&self) -> bool {
        self.shard_resize.is_none()
            && self.added.is_empty()
            && self.decommission.removed.is_empty()
            && self.change.is_none()
    }
}

/// Drives replication groups through an injected control plane.
pub struct Reconciler<C> {
    control_plane: Arc<C>,
    config: ReconcilerConfig,
    metrics: Option<Arc<Metrics>>,
}

impl<C: ControlPlane> Reconciler<C> {
    pub fn new(control_plane: Arc<C>, config: ReconcilerConfig) -> Self {
        Self {
            control_plane,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    fn context(&self, replication_group_id: &str, options: &RunOptions) -> Context<C> {
        let mut ctx = Context::new(
            self.control_plane.clone(),
            self.config.clone(),
            replication_group_id,
        )
        .with_metrics(self.metrics.clone());
        if let Some(cancel) = &options.cancel {
            ctx = ctx.with_cancellation(cancel.clone());
        }
        if let Some(timeout) = options.timeout {
            ctx = ctx.with_deadline(Instant::now() + timeout);
        }
        ctx
    }

    /// Converge the replication group from `old` to `new`.
    pub async fn reconcile(
        &self,
        old: &Topology,
        new: &Topology,
        final_snapshot_id: Option<&str>,
    ) -> Result<ReconcileOutcome> {
        self.reconcile_with(old, new, final_snapshot_id, &RunOptions::default())
            .await
    }

    /// Like [`Reconciler::reconcile`], bounded by a deadline and cancellation.
    pub async fn reconcile_with(
        &self,
        old: &Topology,
        new: &Topology,
        final_snapshot_id: Option<&str>,
        options: &RunOptions,
    ) -> Result<ReconcileOutcome> {
        let reconcile_id = Uuid::new_v4();
        let span = info_span!(
            "reconcile",
            %reconcile_id,
            replication_group_id = %new.replication_group_id
        );

        self.reconcile_in_span(reconcile_id, old, new, final_snapshot_id, options)
            .instrument(span)
            .await
    }

    async fn reconcile_in_span(
        &self,
        reconcile_id: Uuid,
        old: &Topology,
        new: &Topology,
        final_snapshot_id: Option<&str>,
        options: &RunOptions,
    ) -> Result<ReconcileOutcome> {
        validate_reconcile(old, new)?;
        let id = normalize_replication_group_id(&new.replication_group_id)?;
        let ctx = self.context(&id, options);

        let started_at = Timestamp::now();
        let start = Instant::now();
        let result = run(&ctx, old, new, final_snapshot_id).await;
        let elapsed = start.elapsed();

        match result {
            Ok(steps) => {
                ctx.record(|m, group| m.record_reconcile(group, elapsed.as_secs_f64()));
                info!(duration_ms = elapsed.as_millis() as u64, "Reconciliation complete");
                Ok(ReconcileOutcome {
                    reconcile_id,
                    replication_group_id: id,
                    shard_resize: steps.shard_resize,
                    added: steps.added,
                    decommission: steps.decommission,
                    change: steps.change,
                    started_at,
                    finished_at: Timestamp::now(),
                })
            }
            Err(e) => {
                ctx.record(|m, group| m.record_error(group));
                error!(error = %e, phase = ?e.phase(), resource = ?e.resource_id(), "Reconciliation failed");
                Err(e)
            }
        }
    }

    /// Describe the replication group as the control plane currently sees it.
    #[instrument(skip(self))]
    pub async fn observe(&self, replication_group_id: &str) -> Result<Topology> {
        let id = normalize_replication_group_id(replication_group_id)?;
        self.control_plane
            .describe_topology(&id)
            .await
            .map_err(|source| {
                if source.is_not_found() {
                    Error::NotFound {
                        kind: ResourceKind::ReplicationGroup,
                        id: id.clone(),
                        phase: Phase::Poll,
                    }
                } else {
                    Error::NonRetryable {
                        operation: "describe replication group",
                        id: id.clone(),
                        phase: Phase::Poll,
                        source,
                    }
                }
            })
    }

    /// Create a replication group, restoring from snapshots if the blueprint
    /// names any, and wait for it to be available.
    pub async fn create(&self, blueprint: &GroupBlueprint) -> Result<Topology> {
        let id = normalize_replication_group_id(&blueprint.replication_group_id)?;
        let ctx = self.context(&id, &RunOptions::default());
        provision_group(&ctx, blueprint).await
    }

    /// Delete a replication group and wait until it is gone.
    ///
    /// The delete is retried while members or snapshots are still changing. A
    /// group that no longer exists counts as deleted.
    #[instrument(skip(self))]
    pub async fn delete(
        &self,
        replication_group_id: &str,
        final_snapshot_id: Option<&str>,
    ) -> Result<()> {
        let id = normalize_replication_group_id(replication_group_id)?;
        let ctx = self.context(&id, &RunOptions::default());

        let (control_plane, group) = (self.control_plane.as_ref(), id.as_str());
        let result = retry_mutation(&ctx, group, ctx.config.group_delete_budget(), move || {
            control_plane.delete_topology(group, final_snapshot_id)
        })
        .await?;
        match result {
            Ok(()) => info!(replication_group_id = %id, "Submitted replication group deletion"),
            Err(e) if e.is_not_found() => {
                info!(replication_group_id = %id, "Replication group already deleted");
                return Ok(());
            }
            Err(source) => return Err(Error::submit("delete replication group", id, source)),
        }

        wait_for_topology_deleted(&ctx, &id, ctx.config.delete_timeout).await
    }
}

struct Steps {
    shard_resize: Option<ShardResize>,
    added: Vec<String>,
    decommission: DecommissionReport,
    change: Option<TopologyChange>,
}

async fn run<C: ControlPlane>(
    ctx: &Context<C>,
    old: &Topology,
    new: &Topology,
    final_snapshot_id: Option<&str>,
) -> Result<Steps> {
    let id = ctx.replication_group_id.as_str();

    let shard_resize = resize_shards(ctx, old.shard_count, new.shard_count).await?;

    let plan = diff_members(old.member_count, new.member_count, id);
    debug!(to_add = ?plan.to_add, to_remove = ?plan.to_remove, "Member plan");
    let added = provision(ctx, &plan.to_add)
        .await?
        .into_iter()
        .map(|member| member.cluster_id)
        .collect();
    let decommission = decommission(
        ctx,
        &plan.to_remove,
        final_snapshot_id,
        new.automatic_failover_enabled,
    )
    .await?;

    // Failover left off by the removal batch is the current value to diff against.
    let mut current = old.clone();
    if decommission.failover_suspended && !decommission.failover_restored {
        current.automatic_failover_enabled = false;
    }
    // Member ids derived in the change must use the normalized group id.
    let desired = Topology {
        replication_group_id: id.to_string(),
        ..new.clone()
    };
    let change = plan_modification(&current, &desired);
    if let Some(change) = &change {
        let control_plane = ctx.control_plane.as_ref();
        retry_mutation(ctx, id, ctx.config.member_budget(), move || {
            control_plane.modify_topology(change)
        })
        .await?
        .map_err(|source| Error::submit("modify replication group", id, source))?;
        info!(?change, "Submitted replication group modification");
        wait_for_topology_available(ctx, id, ctx.config.update_timeout).await?;
    }

    Ok(Steps {
        shard_resize,
        added,
        decommission,
        change,
    })
}
