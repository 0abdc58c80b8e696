//! Timeouts and retry budgets for reconciliation.
//!
//! Defaults follow the managed service's own guidance for replication groups:
//! creation can take up to an hour, updates and deletion up to forty minutes.

use std::time::Duration;

use tracing::warn;

/// Default timeout for replication group creation.
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// Default timeout for each wait during an update.
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(40 * 60);
/// Default timeout for replication group deletion.
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(40 * 60);
/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Retry budget for member mutations that hit a busy replication group.
pub const DEFAULT_MEMBER_RETRY_BUDGET: Duration = Duration::from_secs(5 * 60);
/// Retry budget for replication group deletion; long enough for in-flight
/// member changes or snapshots to finish.
pub const DEFAULT_GROUP_DELETE_RETRY_BUDGET: Duration = Duration::from_secs(10 * 60);
/// Default interval between retries of a busy mutation.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Total duration and sleep interval for retrying one mutating call.
///
/// A budget carries no state; a fresh one is used for every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub total_duration: Duration,
    pub poll_interval: Duration,
}

impl RetryBudget {
    pub const fn new(total_duration: Duration, poll_interval: Duration) -> Self {
        Self {
            total_duration,
            poll_interval,
        }
    }
}

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub create_timeout: Duration,
    pub update_timeout: Duration,
    pub delete_timeout: Duration,
    pub poll_interval: Duration,
    pub member_retry_budget: Duration,
    pub group_delete_retry_budget: Duration,
    pub retry_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            create_timeout: DEFAULT_CREATE_TIMEOUT,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
            delete_timeout: DEFAULT_DELETE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            member_retry_budget: DEFAULT_MEMBER_RETRY_BUDGET,
            group_delete_retry_budget: DEFAULT_GROUP_DELETE_RETRY_BUDGET,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl ReconcilerConfig {
    /// Build configuration from `RGR_*_SECS` environment variables, falling
    /// back to defaults for missing or malformed values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| -> Duration {
            match lookup(key) {
                None => default,
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(v) => Duration::from_secs(v),
                    Err(_) => {
                        warn!(key, value = %raw, "Invalid duration, using default");
                        default
                    }
                },
            }
        };

        Self {
            create_timeout: secs("RGR_CREATE_TIMEOUT_SECS", defaults.create_timeout),
            update_timeout: secs("RGR_UPDATE_TIMEOUT_SECS", defaults.update_timeout),
            delete_timeout: secs("RGR_DELETE_TIMEOUT_SECS", defaults.delete_timeout),
            poll_interval: secs("RGR_POLL_INTERVAL_SECS", defaults.poll_interval),
            member_retry_budget: secs("RGR_MEMBER_RETRY_BUDGET_SECS", defaults.member_retry_budget),
            group_delete_retry_budget: secs(
                "RGR_GROUP_DELETE_RETRY_BUDGET_SECS",
                defaults.group_delete_retry_budget,
            ),
            retry_interval: secs("RGR_RETRY_INTERVAL_SECS", defaults.retry_interval),
        }
    }

    /// Set the update timeout.
    pub fn with_update_timeout(mut self, timeout: Duration) -> Self {
        self.update_timeout = timeout;
        self
    }

    /// Set the create timeout.
    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout = timeout;
        self
    }

    /// Set the delete timeout.
    pub fn with_delete_timeout(mut self, timeout: Duration) -> Self {
        self.delete_timeout = timeout;
        self
    }

    /// Set the status poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the retry interval for busy mutations.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Retry budget for member create/delete and group modify calls.
    pub fn member_budget(&self) -> RetryBudget {
        RetryBudget::new(self.member_retry_budget, self.retry_interval)
    }

    /// Retry budget for deleting a whole replication group.
    pub fn group_delete_budget(&self) -> RetryBudget {
        RetryBudget::new(self.group_delete_retry_budget, self.retry_interval)
    }
}
