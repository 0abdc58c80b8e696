//! Reconciliation engine for replication groups.
//!
//! Contains the status poller, the bounded retry executor, member planning, the
//! provisioner and decommissioner, shard resizing and the top-level reconciler.

// Shared modules
pub mod config;
pub mod context;
pub mod error;
pub mod retry;
pub mod waiter;

// Planning
pub mod change_set;
pub mod member_plan;
pub mod validation;

// Steps
pub mod decommissioner;
pub mod provisioner;
pub mod shard_resizer;

pub mod reconciler;
