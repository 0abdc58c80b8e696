//! Control plane client module.
//!
//! This module defines the seam between the reconciler and the managed caching
//! service's control plane.
//!
//! ## Architecture
//!
//! - `types`: Replication group and member types with their status vocabularies
//! - `control_plane`: The `ControlPlane` capability trait, request types and
//!   error classification
//! - `simulator`: An in-memory control plane for dry runs and tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use replication_group_reconciler::client::{ControlPlane, SimulatedControlPlane, Topology};
//!
//! let control_plane = SimulatedControlPlane::new();
//! control_plane.seed(Topology::flat("cache", 2)).await;
//! let topology = control_plane.describe_topology("cache").await?;
//! assert_eq!(topology.member_count, 2);
//! ```

pub mod control_plane;
pub mod simulator;
pub mod types;

pub use control_plane::{
    ControlPlane, ControlPlaneError, CreateMemberRequest, CreateTopologyRequest, ErrorClass,
    NodeGroupConfiguration, ShardConfigurationRequest, TopologyChange,
};
pub use simulator::{Call, Operation, SimulatedControlPlane};
pub use types::{
    GroupSettings, Member, MemberRole, MemberStatus, Observed, ParseError, ResourceKind,
    ResourceStatus, Topology, TopologyStatus,
};
