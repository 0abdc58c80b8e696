//! Types describing replication groups and their members as reported by the
//! control plane.
//!
//! Status values use the control plane's lowercase, hyphenated vocabulary for
//! both parsing and display so they round-trip through logs and JSON plans.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when parsing status or role strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown replication group status: {0}")]
    UnknownTopologyStatus(String),
    #[error("Unknown member status: {0}")]
    UnknownMemberStatus(String),
    #[error("Unknown member role: {0}")]
    UnknownMemberRole(String),
}

/// Kind of remote resource, used to label waits and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// A replication group (the reconciliation unit).
    ReplicationGroup,
    /// A single member cache cluster of a replication group.
    Member,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::ReplicationGroup => write!(f, "replication group"),
            ResourceKind::Member => write!(f, "member"),
        }
    }
}

/// A status vocabulary that the status poller can wait on.
pub trait ResourceStatus: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// The kind of resource this vocabulary belongs to.
    const KIND: ResourceKind;

    /// Whether this status means the resource will never reach a healthy state
    /// without outside intervention.
    fn is_terminal_failure(&self) -> bool;
}

/// Anything that reports a status from a [`ResourceStatus`] vocabulary.
pub trait Observed: fmt::Debug + Send {
    type Status: ResourceStatus;

    fn status(&self) -> Self::Status;
}

/// Lifecycle status of a replication group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyStatus {
    Creating,
    #[default]
    Available,
    Modifying,
    Snapshotting,
    Deleting,
    Deleted,
    CreateFailed,
}

impl ResourceStatus for TopologyStatus {
    const KIND: ResourceKind = ResourceKind::ReplicationGroup;

    fn is_terminal_failure(&self) -> bool {
        matches!(self, TopologyStatus::CreateFailed)
    }
}

impl FromStr for TopologyStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "creating" => Ok(TopologyStatus::Creating),
            "available" => Ok(TopologyStatus::Available),
            "modifying" => Ok(TopologyStatus::Modifying),
            "snapshotting" => Ok(TopologyStatus::Snapshotting),
            "deleting" => Ok(TopologyStatus::Deleting),
            "deleted" => Ok(TopologyStatus::Deleted),
            "create-failed" => Ok(TopologyStatus::CreateFailed),
            _ => Err(ParseError::UnknownTopologyStatus(s.to_string())),
        }
    }
}

impl fmt::Display for TopologyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyStatus::Creating => write!(f, "creating"),
            TopologyStatus::Available => write!(f, "available"),
            TopologyStatus::Modifying => write!(f, "modifying"),
            TopologyStatus::Snapshotting => write!(f, "snapshotting"),
            TopologyStatus::Deleting => write!(f, "deleting"),
            TopologyStatus::Deleted => write!(f, "deleted"),
            TopologyStatus::CreateFailed => write!(f, "create-failed"),
        }
    }
}

/// Lifecycle status of a single member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemberStatus {
    Creating,
    Available,
    Modifying,
    Snapshotting,
    Deleting,
    Deleted,
    RestoreFailed,
    IncompatibleNetwork,
}

impl ResourceStatus for MemberStatus {
    const KIND: ResourceKind = ResourceKind::Member;

    fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            MemberStatus::RestoreFailed | MemberStatus::IncompatibleNetwork
        )
    }
}

impl FromStr for MemberStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "creating" => Ok(MemberStatus::Creating),
            "available" => Ok(MemberStatus::Available),
            "modifying" => Ok(MemberStatus::Modifying),
            "snapshotting" => Ok(MemberStatus::Snapshotting),
            "deleting" => Ok(MemberStatus::Deleting),
            "deleted" => Ok(MemberStatus::Deleted),
            "restore-failed" => Ok(MemberStatus::RestoreFailed),
            "incompatible-network" => Ok(MemberStatus::IncompatibleNetwork),
            _ => Err(ParseError::UnknownMemberStatus(s.to_string())),
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberStatus::Creating => write!(f, "creating"),
            MemberStatus::Available => write!(f, "available"),
            MemberStatus::Modifying => write!(f, "modifying"),
            MemberStatus::Snapshotting => write!(f, "snapshotting"),
            MemberStatus::Deleting => write!(f, "deleting"),
            MemberStatus::Deleted => write!(f, "deleted"),
            MemberStatus::RestoreFailed => write!(f, "restore-failed"),
            MemberStatus::IncompatibleNetwork => write!(f, "incompatible-network"),
        }
    }
}

/// Replication role of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemberRole {
    Primary,
    Replica,
    #[default]
    Unknown,
}

impl FromStr for MemberRole {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Ok(MemberRole::Primary),
            "replica" => Ok(MemberRole::Replica),
            "unknown" => Ok(MemberRole::Unknown),
            _ => Err(ParseError::UnknownMemberRole(s.to_string())),
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRole::Primary => write!(f, "primary"),
            MemberRole::Replica => write!(f, "replica"),
            MemberRole::Unknown => write!(f, "unknown"),
        }
    }
}

/// General attributes of a replication group that are changed in place by a
/// single modify call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupSettings {
    pub description: String,
    pub apply_immediately: bool,
    pub auto_minor_version_upgrade: bool,
    pub node_type: Option<String>,
    pub engine_version: Option<String>,
    pub parameter_group_name: Option<String>,
    pub maintenance_window: Option<String>,
    pub notification_topic_arn: Option<String>,
    pub security_group_ids: Vec<String>,
    pub snapshot_retention_limit: u32,
    pub snapshot_window: Option<String>,
}

/// Observed or desired shape of a replication group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    /// Immutable identifier of the replication group.
    pub replication_group_id: String,
    /// Number of member cache clusters (flat topologies).
    pub member_count: u32,
    /// Number of node groups (sharded topologies).
    pub shard_count: u32,
    pub automatic_failover_enabled: bool,
    #[serde(default)]
    pub status: TopologyStatus,
    /// Member cache cluster ids, as reported by the control plane.
    #[serde(default)]
    pub member_clusters: Vec<String>,
    /// Current write-primary, when the control plane reports one.
    #[serde(default)]
    pub primary_member: Option<String>,
    #[serde(default)]
    pub settings: GroupSettings,
}

impl Topology {
    /// Create a flat, available topology with the given number of members.
    pub fn flat(replication_group_id: impl Into<String>, member_count: u32) -> Self {
        Self {
            replication_group_id: replication_group_id.into(),
            member_count,
            shard_count: 1,
            automatic_failover_enabled: false,
            status: TopologyStatus::Available,
            member_clusters: Vec::new(),
            primary_member: None,
            settings: GroupSettings::default(),
        }
    }

    /// Create a sharded, available topology with the given number of node groups.
    pub fn sharded(replication_group_id: impl Into<String>, shard_count: u32) -> Self {
        Self {
            shard_count,
            ..Self::flat(replication_group_id, 1)
        }
    }

    /// Set the automatic failover flag.
    pub fn with_automatic_failover(mut self, enabled: bool) -> Self {
        self.automatic_failover_enabled = enabled;
        self
    }

    /// Replace the general settings block.
    pub fn with_settings(mut self, settings: GroupSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Whether the given member id is part of this topology.
    pub fn has_member(&self, cluster_id: &str) -> bool {
        self.member_clusters.iter().any(|m| m == cluster_id)
    }
}

impl Observed for Topology {
    type Status = TopologyStatus;

    fn status(&self) -> TopologyStatus {
        self.status
    }
}

/// One member cache cluster of a replication group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub cluster_id: String,
    pub replication_group_id: String,
    pub role: MemberRole,
    pub status: MemberStatus,
}

impl Member {
    pub fn is_primary(&self) -> bool {
        self.role == MemberRole::Primary
    }
}

impl Observed for Member {
    type Status = MemberStatus;

    fn status(&self) -> MemberStatus {
        self.status
    }
}
