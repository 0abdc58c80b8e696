//! Shared fixtures for functional tests.
//!
//! `Harness` wires a [`Reconciler`] to a seeded [`SimulatedControlPlane`] and
//! offers helpers to inspect the recorded call log.

use std::sync::Arc;

use replication_group_reconciler::client::{Call, Operation, SimulatedControlPlane, Topology};
use replication_group_reconciler::controller::config::ReconcilerConfig;
use replication_group_reconciler::controller::context::Context;
use replication_group_reconciler::{Metrics, Reconciler};

/// Replication group id used throughout the functional tests.
pub const GROUP: &str = "cache";

/// A reconciler bound to an in-memory control plane.
pub struct Harness {
    pub sim: Arc<SimulatedControlPlane>,
    pub metrics: Arc<Metrics>,
    pub reconciler: Reconciler<SimulatedControlPlane>,
}

impl Harness {
    /// Build a harness around an empty simulator.
    pub fn empty() -> Self {
        Self::with_sim(SimulatedControlPlane::new())
    }

    /// Build a harness around `sim`.
    pub fn with_sim(sim: SimulatedControlPlane) -> Self {
        let sim = Arc::new(sim);
        let metrics = Arc::new(Metrics::new());
        let reconciler =
            Reconciler::new(sim.clone(), ReconcilerConfig::default()).with_metrics(metrics.clone());
        Self {
            sim,
            metrics,
            reconciler,
        }
    }

    /// Build a harness with `topology` already seeded.
    pub async fn seeded(topology: Topology) -> Self {
        let harness = Self::empty();
        harness.sim.seed(topology).await;
        harness
    }

    /// A context for calling individual steps directly.
    pub fn context(&self) -> Context<SimulatedControlPlane> {
        Context::new(self.sim.clone(), ReconcilerConfig::default(), GROUP)
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.sim.calls().await
    }

    /// Operations of every mutating call, in order.
    pub async fn mutation_ops(&self) -> Vec<Operation> {
        self.sim
            .mutations()
            .await
            .iter()
            .map(Call::operation)
            .collect()
    }

    /// Values sent for automatic failover, in order.
    pub async fn failover_toggles(&self) -> Vec<bool> {
        failover_toggles(&self.calls().await)
    }

    /// Member ids passed to delete calls, in order, including rejected ones.
    pub async fn deletes(&self) -> Vec<String> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                Call::DeleteMember { cluster_id, .. } => Some(cluster_id),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded calls of `operation`.
    pub async fn count(&self, operation: Operation) -> usize {
        self.calls()
            .await
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }
}

/// Values sent for automatic failover, in order.
pub fn failover_toggles(calls: &[Call]) -> Vec<bool> {
    calls
        .iter()
        .filter_map(|c| match c {
            Call::ModifyTopology(change) => change.automatic_failover_enabled,
            _ => None,
        })
        .collect()
}

/// Index of the first call matching `predicate`.
pub fn first_index(calls: &[Call], predicate: impl Fn(&Call) -> bool) -> Option<usize> {
    calls.iter().position(predicate)
}

/// Index of the last call matching `predicate`.
pub fn last_index(calls: &[Call], predicate: impl Fn(&Call) -> bool) -> Option<usize> {
    calls.iter().rposition(predicate)
}

/// Flat topology for [`GROUP`].
pub fn flat(member_count: u32) -> Topology {
    Topology::flat(GROUP, member_count)
}

/// Sharded topology for [`GROUP`].
pub fn sharded(shard_count: u32) -> Topology {
    Topology::sharded(GROUP, shard_count)
}
