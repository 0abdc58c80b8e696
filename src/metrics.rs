//! Prometheus metrics for reconciliations.
//!
//! Metrics are labelled by replication group and can be rendered in the
//! Prometheus text format with [`Metrics::encode`].

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// Labels for per-replication-group metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct GroupLabels {
    pub replication_group: String,
}

impl GroupLabels {
    fn new(replication_group: &str) -> Self {
        Self {
            replication_group: replication_group.to_string(),
        }
    }
}

impl EncodeLabelSet for GroupLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("replication_group", self.replication_group.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the reconciler
pub struct Metrics {
    /// Total reconciliations counter
    pub reconciliations_total: Family<GroupLabels, Counter>,
    /// Failed reconciliations counter
    pub reconciliation_errors_total: Family<GroupLabels, Counter>,
    /// Reconciliation duration histogram
    pub reconcile_duration_seconds: Family<GroupLabels, Histogram>,
    /// Members created
    pub members_added_total: Family<GroupLabels, Counter>,
    /// Members deleted
    pub members_removed_total: Family<GroupLabels, Counter>,
    /// Primary reassignments performed before removing a member
    pub primary_reassignments_total: Family<GroupLabels, Counter>,
    /// Mutations retried because the resource was busy
    pub transient_retries_total: Family<GroupLabels, Counter>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let reconciliations_total = Family::<GroupLabels, Counter>::default();
        registry.register(
            "rgr_reconciliations",
            "Total number of reconciliations",
            reconciliations_total.clone(),
        );

        let reconciliation_errors_total = Family::<GroupLabels, Counter>::default();
        registry.register(
            "rgr_reconciliation_errors",
            "Total number of failed reconciliations",
            reconciliation_errors_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<GroupLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(1.0, 2.0, 14))
            });
        registry.register(
            "rgr_reconcile_duration_seconds",
            "Duration of reconciliation in seconds",
            reconcile_duration_seconds.clone(),
        );

        let members_added_total = Family::<GroupLabels, Counter>::default();
        registry.register(
            "rgr_members_added",
            "Total number of members created",
            members_added_total.clone(),
        );

        let members_removed_total = Family::<GroupLabels, Counter>::default();
        registry.register(
            "rgr_members_removed",
            "Total number of members deleted",
            members_removed_total.clone(),
        );

        let primary_reassignments_total = Family::<GroupLabels, Counter>::default();
        registry.register(
            "rgr_primary_reassignments",
            "Total number of primary reassignments before member removal",
            primary_reassignments_total.clone(),
        );

        let transient_retries_total = Family::<GroupLabels, Counter>::default();
        registry.register(
            "rgr_transient_retries",
            "Total number of mutations retried on a busy resource",
            transient_retries_total.clone(),
        );

        Self {
            reconciliations_total,
            reconciliation_errors_total,
            reconcile_duration_seconds,
            members_added_total,
            members_removed_total,
            primary_reassignments_total,
            transient_retries_total,
            registry,
        }
    }

    /// Record a successful reconciliation
    pub fn record_reconcile(&self, replication_group: &str, duration_secs: f64) {
        let labels = GroupLabels::new(replication_group);
        self.reconciliations_total.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Record a failed reconciliation
    pub fn record_error(&self, replication_group: &str) {
        self.reconciliation_errors_total
            .get_or_create(&GroupLabels::new(replication_group))
            .inc();
    }

    pub fn record_members_added(&self, replication_group: &str, count: u64) {
        self.members_added_total
            .get_or_create(&GroupLabels::new(replication_group))
            .inc_by(count);
    }

    pub fn record_members_removed(&self, replication_group: &str, count: u64) {
        self.members_removed_total
            .get_or_create(&GroupLabels::new(replication_group))
            .inc_by(count);
    }

    pub fn record_primary_reassignment(&self, replication_group: &str) {
        self.primary_reassignments_total
            .get_or_create(&GroupLabels::new(replication_group))
            .inc();
    }

    pub fn record_transient_retry(&self, replication_group: &str) {
        self.transient_retries_total
            .get_or_create(&GroupLabels::new(replication_group))
            .inc();
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}
