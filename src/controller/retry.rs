//! Bounded retry of mutating control plane calls.
//!
//! A mutation that hits a resource mid-transition is retried until the budget's
//! wall-clock duration runs out. After that, one more attempt is made without
//! checking the error class and its result is handed back as is, so the call is
//! always attempted at least once past the budget even if the loop itself was
//! starved by slow responses.

use std::future::Future;

use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::config::RetryBudget;
use super::context::Context;
use super::error::{Phase, Result};
use crate::client::{ControlPlaneError, ErrorClass};

/// Run `mutation`, retrying transient conflicts within `budget`.
///
/// The outer `Result` only fails when the caller cancels during a retry sleep.
/// The inner result is the remote outcome: success, the first error that is not
/// a transient conflict, or the verbatim result of the final attempt.
#[instrument(skip(ctx, mutation))]
pub async fn retry_mutation<C, T, F, Fut>(
    ctx: &Context<C>,
    id: &str,
    budget: RetryBudget,
    mut mutation: F,
) -> Result<std::result::Result<T, ControlPlaneError>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ControlPlaneError>>,
{
    let total = ctx.bounded(budget.total_duration);
    let start = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        ctx.ensure_active(id, Phase::Submit)?;
        attempt += 1;

        let err = match mutation().await {
            Ok(value) => return Ok(Ok(value)),
            Err(err) if err.classify() == ErrorClass::TransientConflict => err,
            Err(err) => return Ok(Err(err)),
        };

        let elapsed = start.elapsed();
        if elapsed >= total {
            warn!(id, attempt, error = %err, "Retry budget exhausted, making final attempt");
            break;
        }

        debug!(id, attempt, error = %err, "Resource busy, retrying");
        ctx.record(|m, group| m.record_transient_retry(group));
        ctx.pause(budget.poll_interval.min(total - elapsed), id, Phase::Submit)
            .await?;
    }

    Ok(mutation().await)
}
