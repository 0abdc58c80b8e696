//! rg-reconcile - dry-run a replication group reconciliation.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Reads a reconcile plan (`old`, `new`, `finalSnapshotId`) from the JSON file named on the command line
//! - Seeds the in-memory control plane with the old topology
//! - Reconciles towards the new topology and prints the outcome as JSON
//!
//! Ctrl-C or SIGTERM stops waiting; operations already submitted are left as is.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use replication_group_reconciler::{
    Metrics, ReconcilerConfig, Reconciler, RunOptions, SimulatedControlPlane, Topology,
};

/// The simulator settles by poll count, not wall time.
const DRY_RUN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Parser)]
#[command(name = "rg-reconcile", version)]
#[command(about = "Dry-run a replication group reconciliation against the in-memory control plane")]
struct Args {
    /// JSON plan with `old`, `new` and an optional `finalSnapshotId`
    plan: PathBuf,

    /// Overall deadline in seconds, overriding the plan's `timeoutSecs`
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Plan {
    old: Topology,
    new: Topology,
    #[serde(default)]
    final_snapshot_id: Option<String>,
    /// Overall deadline in seconds.
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so stdout carries only the outcome
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("replication_group_reconciler=info".parse()?)
                .add_directive("rg_reconcile=info".parse()?),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let plan: Plan = serde_json::from_str(&std::fs::read_to_string(&args.plan)?)?;
    info!(plan = %args.plan.display(), replication_group_id = %plan.new.replication_group_id, "Starting dry run");

    let control_plane = Arc::new(SimulatedControlPlane::new());
    control_plane.seed(plan.old.clone()).await;
    if let Some(primary) = &plan.old.primary_member {
        control_plane.set_primary(primary).await;
    }

    let config = ReconcilerConfig::from_env()
        .with_poll_interval(DRY_RUN_POLL_INTERVAL)
        .with_retry_interval(DRY_RUN_POLL_INTERVAL);
    let metrics = Arc::new(Metrics::new());
    let reconciler = Reconciler::new(control_plane.clone(), config).with_metrics(metrics.clone());

    let cancel = CancellationToken::new();
    let mut options = RunOptions::default().with_cancel(cancel.clone());
    if let Some(secs) = args.timeout_secs.or(plan.timeout_secs) {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, cancelling reconciliation");
        cancel.cancel();
    });

    let result = reconciler
        .reconcile_with(
            &plan.old,
            &plan.new,
            plan.final_snapshot_id.as_deref(),
            &options,
        )
        .await;
    signal_handle.abort();
    debug!(metrics = %metrics.encode(), "Reconciliation metrics");

    match result {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if let Some(topology) = control_plane.topology(&outcome.replication_group_id).await {
                info!(
                    member_count = topology.member_count,
                    shard_count = topology.shard_count,
                    automatic_failover_enabled = topology.automatic_failover_enabled,
                    "Final topology"
                );
            }
            Ok(())
        }
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "Dry run failed");
            Err(e.into())
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal; there is no way to cancel
/// without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
