//! Per-reconciliation context.
//!
//! The Context struct carries everything an operation needs while it talks to
//! the control plane: the injected client, timeouts, optional metrics, and the
//! cancellation token and deadline that bound every suspension point.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::config::ReconcilerConfig;
use super::error::{Error, Phase, Result};
use crate::metrics::Metrics;

/// Shared context for one reconciliation of one replication group
pub struct Context<C> {
    /// Control plane client
    pub control_plane: Arc<C>,
    /// Timeouts and retry budgets
    pub config: ReconcilerConfig,
    /// Replication group being reconciled
    pub replication_group_id: String,
    /// Optional metrics sink
    pub metrics: Option<Arc<Metrics>>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl<C> Context<C> {
    /// Create a new context
    pub fn new(
        control_plane: Arc<C>,
        config: ReconcilerConfig,
        replication_group_id: impl Into<String>,
    ) -> Self {
        Self {
            control_plane,
            config,
            replication_group_id: replication_group_id.into(),
            metrics: None,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Stop waiting when `cancel` fires. Remote operations already submitted
    /// are left running.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bound every wait and retry by an overall deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Clamp a timeout to what is left before the overall deadline.
    pub fn bounded(&self, timeout: Duration) -> Duration {
        match self.deadline {
            Some(deadline) => timeout.min(deadline.saturating_duration_since(Instant::now())),
            None => timeout,
        }
    }

    /// Sleep for `duration` unless cancelled first.
    pub async fn pause(&self, duration: Duration, id: &str, phase: Phase) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled {
                id: id.to_string(),
                phase,
            }),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Fail fast if the caller has already cancelled.
    pub fn ensure_active(&self, id: &str, phase: Phase) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled {
                id: id.to_string(),
                phase,
            });
        }
        Ok(())
    }

    /// Record a metric if a metrics sink is configured.
    pub fn record(&self, f: impl FnOnce(&Metrics, &str)) {
        if let Some(metrics) = &self.metrics {
            f(metrics, &self.replication_group_id);
        }
    }
}
