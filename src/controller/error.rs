//! Error types for the reconciler.
//!
//! Every error that reaches the caller names the resource it concerns and the
//! phase it failed in, so a retry can resume narrowly after re-reading state.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::client::{ControlPlaneError, ResourceKind};

/// Phase of an operation in which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Submitting a mutating request.
    Submit,
    /// Polling for a status.
    Poll,
    /// Reassigning the primary before removing a member.
    Reassignment,
    /// Restoring automatic failover after removals.
    Restore,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Submit => write!(f, "submit"),
            Phase::Poll => write!(f, "poll"),
            Phase::Reassignment => write!(f, "reassignment"),
            Phase::Restore => write!(f, "restore"),
        }
    }
}

/// Error type for reconciliation operations
#[derive(Error, Debug)]
pub enum Error {
    /// Resource disappeared while waiting for it to become ready
    #[error("{kind} {id} not found during {phase}")]
    NotFound {
        kind: ResourceKind,
        id: String,
        phase: Phase,
    },

    /// Resource reached a status it will not recover from
    #[error("{kind} {id} reached terminal status {status} during {phase}")]
    TerminalState {
        kind: ResourceKind,
        id: String,
        status: String,
        phase: Phase,
    },

    /// Wait exceeded its timeout or the caller's deadline
    #[error("timed out after {waited:?} waiting for {kind} {id} to be {target}")]
    Timeout {
        kind: ResourceKind,
        id: String,
        target: String,
        waited: Duration,
    },

    /// A member creation was rejected; earlier submissions are left outstanding
    #[error("error creating member {id} (already submitted: {submitted:?}): {source}")]
    PartialProvisioning {
        id: String,
        submitted: Vec<String>,
        source: ControlPlaneError,
    },

    /// No surviving member can take over as primary
    #[error(
        "unable to assign new primary in replication group {replication_group_id} before removing {id}"
    )]
    NoEligiblePrimary {
        replication_group_id: String,
        id: String,
    },

    /// Control plane call failed with an error that is not retried
    #[error("error during {operation} of {id} ({phase}): {source}")]
    NonRetryable {
        operation: &'static str,
        id: String,
        phase: Phase,
        source: ControlPlaneError,
    },

    /// Caller cancelled the reconciliation while it was waiting
    #[error("cancelled while waiting on {id} during {phase}")]
    Cancelled { id: String, phase: Phase },

    /// Request rejected before any remote call
    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Wrap a control plane error raised by a mutating call.
    pub fn submit(operation: &'static str, id: impl Into<String>, source: ControlPlaneError) -> Self {
        Error::NonRetryable {
            operation,
            id: id.into(),
            phase: Phase::Submit,
            source,
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::NonRetryable { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if re-reconciling from freshly observed state may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout { .. } | Error::Cancelled { .. } | Error::PartialProvisioning { .. } => {
                true
            }
            Error::NonRetryable { source, .. } => source.is_retryable_read(),
            Error::NotFound { .. }
            | Error::TerminalState { .. }
            | Error::NoEligiblePrimary { .. }
            | Error::Validation(_) => false,
        }
    }

    /// Phase the error occurred in, if it is tied to one
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::NotFound { phase, .. }
            | Error::TerminalState { phase, .. }
            | Error::NonRetryable { phase, .. }
            | Error::Cancelled { phase, .. } => Some(*phase),
            Error::Timeout { .. } => Some(Phase::Poll),
            Error::PartialProvisioning { .. } => Some(Phase::Submit),
            Error::NoEligiblePrimary { .. } => Some(Phase::Reassignment),
            Error::Validation(_) => None,
        }
    }

    /// Identifier of the resource the error concerns
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Error::NotFound { id, .. }
            | Error::TerminalState { id, .. }
            | Error::Timeout { id, .. }
            | Error::PartialProvisioning { id, .. }
            | Error::NoEligiblePrimary { id, .. }
            | Error::NonRetryable { id, .. }
            | Error::Cancelled { id, .. } => Some(id),
            Error::Validation(_) => None,
        }
    }
}

/// Result type alias for reconciliation operations
pub type Result<T> = std::result::Result<T, Error>;
