//! replication-group-reconciler library crate
//!
//! Converges a managed, replicated cache cluster ("replication group") from an
//! observed topology to a desired one through an injected control plane client.
//! This module exports the control plane seam, the reconciliation engine and
//! its metrics.

pub mod client;
pub mod controller;
pub mod metrics;

pub use client::{ControlPlane, ControlPlaneError, SimulatedControlPlane, Topology};
pub use controller::config::ReconcilerConfig;
pub use controller::error::{Error, Phase, Result};
pub use controller::provisioner::GroupBlueprint;
pub use controller::reconciler::{ReconcileOutcome, Reconciler, RunOptions};
pub use metrics::Metrics;
