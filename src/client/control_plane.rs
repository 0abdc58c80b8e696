//! The remote control plane capability set consumed by the reconciler.
//!
//! Implementations translate these calls to a concrete provider API. The
//! reconciler only depends on this trait, so it is handed an implementation
//! explicitly instead of reaching for a shared client.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{GroupSettings, Member, ResourceKind, Topology};

/// Errors returned by the remote control plane.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlPlaneError {
    #[error("{kind} {id} not found")]
    NotFound { kind: ResourceKind, id: String },

    /// The resource is mid-transition and cannot accept the request yet.
    #[error("{kind} {id} is not in a valid state: {message}")]
    InvalidState {
        kind: ResourceKind,
        id: String,
        message: String,
    },

    /// A delete or modify targeted the member currently serving as primary.
    #[error("member {id} is serving as primary")]
    ServingAsPrimary { id: String },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: ResourceKind, id: String },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// How the reconciler reacts to a control plane error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    /// Retried by the bounded retry executor.
    TransientConflict,
    /// Triggers primary reassignment in the decommissioner.
    PrimaryConflict,
    NonRetryable,
}

impl ControlPlaneError {
    /// Classify this error for retry and reassignment decisions.
    pub fn classify(&self) -> ErrorClass {
        match self {
            ControlPlaneError::NotFound { .. } => ErrorClass::NotFound,
            ControlPlaneError::InvalidState { .. } => ErrorClass::TransientConflict,
            ControlPlaneError::ServingAsPrimary { .. } => ErrorClass::PrimaryConflict,
            ControlPlaneError::AlreadyExists { .. }
            | ControlPlaneError::Rejected(_)
            | ControlPlaneError::Throttled(_)
            | ControlPlaneError::Transport(_) => ErrorClass::NonRetryable,
        }
    }

    /// Whether a read that failed with this error can simply be repeated.
    pub fn is_retryable_read(&self) -> bool {
        matches!(
            self,
            ControlPlaneError::InvalidState { .. }
                | ControlPlaneError::Throttled(_)
                | ControlPlaneError::Transport(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.classify() == ErrorClass::NotFound
    }
}

/// Request to add one member cache cluster to a replication group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberRequest {
    pub cluster_id: String,
    pub replication_group_id: String,
}

/// Immutable set of attribute changes applied by one modify call.
///
/// Fields left as `None` are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyChange {
    pub replication_group_id: String,
    pub apply_immediately: bool,
    pub description: Option<String>,
    pub automatic_failover_enabled: Option<bool>,
    pub primary_cluster_id: Option<String>,
    pub auto_minor_version_upgrade: Option<bool>,
    pub node_type: Option<String>,
    pub engine_version: Option<String>,
    pub parameter_group_name: Option<String>,
    pub maintenance_window: Option<String>,
    pub notification_topic_arn: Option<String>,
    pub security_group_ids: Option<Vec<String>>,
    pub snapshot_retention_limit: Option<u32>,
    pub snapshotting_cluster_id: Option<String>,
    pub snapshot_window: Option<String>,
}

/// Request to change the number of node groups of a sharded replication group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardConfigurationRequest {
    pub replication_group_id: String,
    pub node_group_count: u32,
    /// Node group ids to remove, highest first. Empty when growing.
    pub node_groups_to_remove: Vec<String>,
    pub apply_immediately: bool,
}

/// Slot layout and placement of one node group, used when restoring from
/// snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupConfiguration {
    pub slots: String,
    pub primary_availability_zone: Option<String>,
    pub replica_availability_zones: Vec<String>,
}

/// Request to create a new replication group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTopologyRequest {
    pub replication_group_id: String,
    pub member_count: Option<u32>,
    pub shard_count: Option<u32>,
    pub replicas_per_shard: Option<u32>,
    pub automatic_failover_enabled: bool,
    pub snapshot_arns: Vec<String>,
    pub node_group_configuration: Vec<NodeGroupConfiguration>,
    pub settings: GroupSettings,
}

/// Capability set of the remote control plane.
pub trait ControlPlane: Send + Sync {
    fn describe_topology(
        &self,
        replication_group_id: &str,
    ) -> impl Future<Output = Result<Topology, ControlPlaneError>> + Send;

    fn describe_member(
        &self,
        cluster_id: &str,
    ) -> impl Future<Output = Result<Member, ControlPlaneError>> + Send;

    /// Submit a member creation. Returns once the request is accepted, not
    /// when the member is available.
    fn create_member(
        &self,
        request: &CreateMemberRequest,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;

    fn delete_member(
        &self,
        cluster_id: &str,
        final_snapshot_id: Option<&str>,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;

    fn modify_topology(
        &self,
        change: &TopologyChange,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;

    fn modify_shard_configuration(
        &self,
        request: &ShardConfigurationRequest,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;

    fn create_topology(
        &self,
        request: &CreateTopologyRequest,
    ) -> impl Future<Output = Result<Topology, ControlPlaneError>> + Send;

    fn delete_topology(
        &self,
        replication_group_id: &str,
        final_snapshot_id: Option<&str>,
    ) -> impl Future<Output = Result<(), ControlPlaneError>> + Send;
}
