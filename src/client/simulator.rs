//! In-memory simulation of the remote control plane.
//!
//! `SimulatedControlPlane` keeps replication groups and their members in memory
//! and moves them through the same transitional statuses the real service
//! reports: a mutation puts the resource into `creating`/`modifying`/`deleting`
//! and it settles after a configurable number of describe calls. It also
//! reproduces the behaviors the reconciler has to cope with:
//!
//! - deleting the current primary fails with `ServingAsPrimary`
//! - promoting a primary while automatic failover is enabled is rejected
//! - mutating a resource that is mid-transition fails with `InvalidState`
//!
//! Faults can be injected per operation and every call is recorded so tests can
//! assert on ordering. The binary uses it for dry runs.

use std::collections::BTreeMap;

use tokio::sync::Mutex;
use tracing::debug;

use super::control_plane::{
    ControlPlane, ControlPlaneError, CreateMemberRequest, CreateTopologyRequest,
    ShardConfigurationRequest, TopologyChange,
};
use super::types::{Member, MemberRole, MemberStatus, ResourceKind, Topology, TopologyStatus};

/// Control plane operations, used for fault injection and call filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DescribeTopology,
    DescribeMember,
    CreateMember,
    DeleteMember,
    ModifyTopology,
    ModifyShardConfiguration,
    CreateTopology,
    DeleteTopology,
}

/// A recorded call against the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DescribeTopology(String),
    DescribeMember(String),
    CreateMember(String),
    DeleteMember {
        cluster_id: String,
        final_snapshot_id: Option<String>,
    },
    ModifyTopology(TopologyChange),
    ModifyShardConfiguration(ShardConfigurationRequest),
    CreateTopology(String),
    DeleteTopology(String),
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::DescribeTopology(_) => Operation::DescribeTopology,
            Call::DescribeMember(_) => Operation::DescribeMember,
            Call::CreateMember(_) => Operation::CreateMember,
            Call::DeleteMember { .. } => Operation::DeleteMember,
            Call::ModifyTopology(_) => Operation::ModifyTopology,
            Call::ModifyShardConfiguration(_) => Operation::ModifyShardConfiguration,
            Call::CreateTopology(_) => Operation::CreateTopology,
            Call::DeleteTopology(_) => Operation::DeleteTopology,
        }
    }

    /// Whether this call mutates remote state.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Call::DescribeTopology(_) | Call::DescribeMember(_))
    }
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    target: Option<String>,
    error: ControlPlaneError,
    remaining: u32,
}

/// A transition in flight. `then: None` means the resource disappears.
#[derive(Debug, Clone, Copy)]
struct Pending<S> {
    remaining: u32,
    then: Option<S>,
}

#[derive(Debug)]
struct SimMember {
    member: Member,
    pending: Option<Pending<MemberStatus>>,
}

#[derive(Debug)]
struct SimGroup {
    topology: Topology,
    members: BTreeMap<String, SimMember>,
    pending: Option<Pending<TopologyStatus>>,
}

impl SimGroup {
    fn snapshot(&self) -> Topology {
        let mut topology = self.topology.clone();
        if !self.members.is_empty() {
            topology.member_clusters = self.members.keys().cloned().collect();
            topology.member_count = self.members.len() as u32;
            topology.primary_member = self
                .members
                .values()
                .find(|m| m.member.is_primary())
                .map(|m| m.member.cluster_id.clone());
        }
        topology
    }

    fn begin(&mut self, status: TopologyStatus, settle_polls: u32, then: Option<TopologyStatus>) {
        self.topology.status = status;
        self.pending = Some(Pending {
            remaining: settle_polls,
            then,
        });
    }

    fn ensure_available(&self) -> Result<(), ControlPlaneError> {
        if self.topology.status == TopologyStatus::Available {
            Ok(())
        } else {
            Err(ControlPlaneError::InvalidState {
                kind: ResourceKind::ReplicationGroup,
                id: self.topology.replication_group_id.clone(),
                message: format!("replication group is {}", self.topology.status),
            })
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    groups: BTreeMap<String, SimGroup>,
    faults: Vec<Fault>,
    calls: Vec<Call>,
}

impl SimState {
    fn take_fault(&mut self, operation: Operation, target: &str) -> Option<ControlPlaneError> {
        let idx = self.faults.iter().position(|f| {
            f.operation == operation && f.target.as_deref().is_none_or(|t| t == target)
        })?;
        let fault = self.faults.get_mut(idx)?;
        let error = fault.error.clone();
        fault.remaining = fault.remaining.saturating_sub(1);
        if fault.remaining == 0 {
            self.faults.remove(idx);
        }
        Some(error)
    }

    fn group_mut(&mut self, id: &str) -> Result<&mut SimGroup, ControlPlaneError> {
        self.groups
            .get_mut(id)
            .ok_or_else(|| ControlPlaneError::NotFound {
                kind: ResourceKind::ReplicationGroup,
                id: id.to_string(),
            })
    }

    fn group_of_member(&self, cluster_id: &str) -> Option<String> {
        self.groups
            .iter()
            .find(|(_, g)| g.members.contains_key(cluster_id))
            .map(|(id, _)| id.clone())
    }

    fn member_not_found(cluster_id: &str) -> ControlPlaneError {
        ControlPlaneError::NotFound {
            kind: ResourceKind::Member,
            id: cluster_id.to_string(),
        }
    }
}

/// In-memory control plane.
#[derive(Debug)]
pub struct SimulatedControlPlane {
    state: Mutex<SimState>,
    settle_polls: u32,
}

impl Default for SimulatedControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedControlPlane {
    /// Create an empty simulator where transitions settle after one describe.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            settle_polls: 1,
        }
    }

    /// Set how many describe calls a transition takes to settle.
    pub fn with_settle_polls(mut self, polls: u32) -> Self {
        self.settle_polls = polls;
        self
    }

    /// Seed an available replication group.
    ///
    /// Flat topologies get members `{id}-001..` with `-001` as primary.
    /// Sharded topologies (shard count above one) are seeded without member
    /// records.
    pub async fn seed(&self, topology: Topology) {
        let mut state = self.state.lock().await;
        let id = topology.replication_group_id.clone();
        let mut members = BTreeMap::new();
        if topology.shard_count <= 1 {
            for seq in 1..=topology.member_count {
                let cluster_id = format!("{}-{:03}", id, seq);
                let role = if seq == 1 {
                    MemberRole::Primary
                } else {
                    MemberRole::Replica
                };
                members.insert(
                    cluster_id.clone(),
                    SimMember {
                        member: Member {
                            cluster_id,
                            replication_group_id: id.clone(),
                            role,
                            status: MemberStatus::Available,
                        },
                        pending: None,
                    },
                );
            }
        }
        let mut topology = topology;
        topology.status = TopologyStatus::Available;
        state.groups.insert(
            id,
            SimGroup {
                topology,
                members,
                pending: None,
            },
        );
    }

    /// Make the given member the primary of its group.
    pub async fn set_primary(&self, cluster_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(group_id) = state.group_of_member(cluster_id)
            && let Some(group) = state.groups.get_mut(&group_id)
        {
            for (id, m) in group.members.iter_mut() {
                m.member.role = if id == cluster_id {
                    MemberRole::Primary
                } else {
                    MemberRole::Replica
                };
            }
        }
    }

    /// Force a member into a status, cancelling any transition in flight.
    pub async fn set_member_status(&self, cluster_id: &str, status: MemberStatus) {
        let mut state = self.state.lock().await;
        for group in state.groups.values_mut() {
            if let Some(m) = group.members.get_mut(cluster_id) {
                m.member.status = status;
                m.pending = None;
            }
        }
    }

    /// Force a replication group into a status, cancelling any transition.
    pub async fn set_topology_status(&self, replication_group_id: &str, status: TopologyStatus) {
        let mut state = self.state.lock().await;
        if let Some(group) = state.groups.get_mut(replication_group_id) {
            group.topology.status = status;
            group.pending = None;
        }
    }

    /// Fail the next `times` calls of `operation`, optionally only for `target`.
    pub async fn inject_fault(
        &self,
        operation: Operation,
        target: Option<&str>,
        error: ControlPlaneError,
        times: u32,
    ) {
        let mut state = self.state.lock().await;
        state.faults.push(Fault {
            operation,
            target: target.map(str::to_string),
            error,
            remaining: times.max(1),
        });
    }

    /// Current view of a group without advancing any transition.
    pub async fn topology(&self, replication_group_id: &str) -> Option<Topology> {
        let state = self.state.lock().await;
        state.groups.get(replication_group_id).map(SimGroup::snapshot)
    }

    /// Current view of a member without advancing any transition.
    pub async fn member(&self, cluster_id: &str) -> Option<Member> {
        let state = self.state.lock().await;
        state
            .groups
            .values()
            .find_map(|g| g.members.get(cluster_id))
            .map(|m| m.member.clone())
    }

    /// All calls recorded so far.
    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    /// Recorded calls that mutate remote state.
    pub async fn mutations(&self) -> Vec<Call> {
        self.calls()
            .await
            .into_iter()
            .filter(Call::is_mutation)
            .collect()
    }
}

impl ControlPlane for SimulatedControlPlane {
    async fn describe_topology(&self, replication_group_id: &str) -> Result<Topology, ControlPlaneError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(Call::DescribeTopology(replication_group_id.to_string()));
        if let Some(err) = state.take_fault(Operation::DescribeTopology, replication_group_id) {
            return Err(err);
        }

        let group = state.group_mut(replication_group_id)?;
        if let Some(mut pending) = group.pending.take() {
            if pending.remaining == 0 {
                match pending.then {
                    Some(status) => group.topology.status = status,
                    None => {
                        state.groups.remove(replication_group_id);
                        return Err(ControlPlaneError::NotFound {
                            kind: ResourceKind::ReplicationGroup,
                            id: replication_group_id.to_string(),
                        });
                    }
                }
            } else {
                pending.remaining -= 1;
                group.pending = Some(pending);
            }
        }
        Ok(group.snapshot())
    }

    async fn describe_member(&self, cluster_id: &str) -> Result<Member, ControlPlaneError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::DescribeMember(cluster_id.to_string()));
        if let Some(err) = state.take_fault(Operation::DescribeMember, cluster_id) {
            return Err(err);
        }

        let group_id = state
            .group_of_member(cluster_id)
            .ok_or_else(|| SimState::member_not_found(cluster_id))?;
        let group = state.group_mut(&group_id)?;
        let Some(entry) = group.members.get_mut(cluster_id) else {
            return Err(SimState::member_not_found(cluster_id));
        };
        if let Some(mut pending) = entry.pending.take() {
            if pending.remaining == 0 {
                match pending.then {
                    Some(status) => entry.member.status = status,
                    None => {
                        group.members.remove(cluster_id);
                        debug!(cluster_id, "Simulated member removed");
                        return Err(SimState::member_not_found(cluster_id));
                    }
                }
            } else {
                pending.remaining -= 1;
                entry.pending = Some(pending);
            }
        }
        Ok(entry.member.clone())
    }

    async fn create_member(&self, request: &CreateMemberRequest) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(Call::CreateMember(request.cluster_id.clone()));
        if let Some(err) = state.take_fault(Operation::CreateMember, &request.cluster_id) {
            return Err(err);
        }
        if state.group_of_member(&request.cluster_id).is_some() {
            return Err(ControlPlaneError::AlreadyExists {
                kind: ResourceKind::Member,
                id: request.cluster_id.clone(),
            });
        }

        let settle_polls = self.settle_polls;
        let group = state.group_mut(&request.replication_group_id)?;
        group.members.insert(
            request.cluster_id.clone(),
            SimMember {
                member: Member {
                    cluster_id: request.cluster_id.clone(),
                    replication_group_id: request.replication_group_id.clone(),
                    role: MemberRole::Replica,
                    status: MemberStatus::Creating,
                },
                pending: Some(Pending {
                    remaining: settle_polls,
                    then: Some(MemberStatus::Available),
                }),
            },
        );
        Ok(())
    }

    async fn delete_member(
        &self,
        cluster_id: &str,
        final_snapshot_id: Option<&str>,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::DeleteMember {
            cluster_id: cluster_id.to_string(),
            final_snapshot_id: final_snapshot_id.map(str::to_string),
        });
        if let Some(err) = state.take_fault(Operation::DeleteMember, cluster_id) {
            return Err(err);
        }

        let settle_polls = self.settle_polls;
        let group_id = state
            .group_of_member(cluster_id)
            .ok_or_else(|| SimState::member_not_found(cluster_id))?;
        let group = state.group_mut(&group_id)?;
        let member_count = group.members.len();
        let Some(entry) = group.members.get_mut(cluster_id) else {
            return Err(SimState::member_not_found(cluster_id));
        };
        if entry.member.is_primary() && member_count > 1 {
            return Err(ControlPlaneError::ServingAsPrimary {
                id: cluster_id.to_string(),
            });
        }
        if entry.member.status != MemberStatus::Available {
            return Err(ControlPlaneError::InvalidState {
                kind: ResourceKind::Member,
                id: cluster_id.to_string(),
                message: format!("member is {}", entry.member.status),
            });
        }
        entry.member.status = MemberStatus::Deleting;
        entry.pending = Some(Pending {
            remaining: settle_polls,
            then: None,
        });
        Ok(())
    }

    async fn modify_topology(&self, change: &TopologyChange) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock().await;
        state.calls.push(Call::ModifyTopology(change.clone()));
        if let Some(err) = state.take_fault(Operation::ModifyTopology, &change.replication_group_id)
        {
            return Err(err);
        }

        let settle_polls = self.settle_polls;
        let group = state.group_mut(&change.replication_group_id)?;
        group.ensure_available()?;

        let failover_after = change
            .automatic_failover_enabled
            .unwrap_or(group.topology.automatic_failover_enabled);
        if let Some(primary) = &change.primary_cluster_id {
            if failover_after {
                return Err(ControlPlaneError::Rejected(
                    "cannot manually promote a new primary while automatic failover is enabled"
                        .to_string(),
                ));
            }
            if !group.members.contains_key(primary) {
                return Err(SimState::member_not_found(primary));
            }
            for (id, m) in group.members.iter_mut() {
                m.member.role = if id == primary {
                    MemberRole::Primary
                } else {
                    MemberRole::Replica
                };
            }
        }

        let topology = &mut group.topology;
        topology.automatic_failover_enabled = failover_after;
        let settings = &mut topology.settings;
        if let Some(v) = &change.description {
            settings.description = v.clone();
        }
        if let Some(v) = change.auto_minor_version_upgrade {
            settings.auto_minor_version_upgrade = v;
        }
        if let Some(v) = &change.node_type {
            settings.node_type = Some(v.clone());
        }
        if let Some(v) = &change.engine_version {
            settings.engine_version = Some(v.clone());
        }
        if let Some(v) = &change.parameter_group_name {
            settings.parameter_group_name = Some(v.clone());
        }
        if let Some(v) = &change.maintenance_window {
            settings.maintenance_window = Some(v.clone());
        }
        if let Some(v) = &change.notification_topic_arn {
            settings.notification_topic_arn = Some(v.clone());
        }
        if let Some(v) = &change.security_group_ids {
            settings.security_group_ids = v.clone();
        }
        if let Some(v) = change.snapshot_retention_limit {
            settings.snapshot_retention_limit = v;
        }
        if let Some(v) = &change.snapshot_window {
            settings.snapshot_window = Some(v.clone());
        }

        group.begin(
            TopologyStatus::Modifying,
            settle_polls,
            Some(TopologyStatus::Available),
        );
        Ok(())
    }

    async fn modify_shard_configuration(
        &self,
        request: &ShardConfigurationRequest,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(Call::ModifyShardConfiguration(request.clone()));
        if let Some(err) = state.take_fault(
            Operation::ModifyShardConfiguration,
            &request.replication_group_id,
        ) {
            return Err(err);
        }

        let settle_polls = self.settle_polls;
        let group = state.group_mut(&request.replication_group_id)?;
        group.ensure_available()?;

        let current = group.topology.shard_count;
        if request.node_group_count < current {
            let expected = current - request.node_group_count;
            if request.node_groups_to_remove.len() != expected as usize {
                return Err(ControlPlaneError::Rejected(format!(
                    "expected {} node groups to remove, got {}",
                    expected,
                    request.node_groups_to_remove.len()
                )));
            }
            for node_group in &request.node_groups_to_remove {
                let known = node_group
                    .parse::<u32>()
                    .is_ok_and(|seq| seq >= 1 && seq <= current);
                if !known {
                    return Err(ControlPlaneError::Rejected(format!(
                        "unknown node group {}",
                        node_group
                    )));
                }
            }
        }

        group.topology.shard_count = request.node_group_count;
        group.begin(
            TopologyStatus::Modifying,
            settle_polls,
            Some(TopologyStatus::Available),
        );
        Ok(())
    }

    async fn create_topology(
        &self,
        request: &CreateTopologyRequest,
    ) -> Result<Topology, ControlPlaneError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(Call::CreateTopology(request.replication_group_id.clone()));
        if let Some(err) = state.take_fault(Operation::CreateTopology, &request.replication_group_id)
        {
            return Err(err);
        }
        if state.groups.contains_key(&request.replication_group_id) {
            return Err(ControlPlaneError::AlreadyExists {
                kind: ResourceKind::ReplicationGroup,
                id: request.replication_group_id.clone(),
            });
        }

        let id = request.replication_group_id.clone();
        let shard_count = request
            .shard_count
            .unwrap_or_else(|| request.node_group_configuration.len().max(1) as u32);
        let member_count = request.member_count.unwrap_or(1);
        let topology = Topology {
            replication_group_id: id.clone(),
            member_count,
            shard_count,
            automatic_failover_enabled: request.automatic_failover_enabled,
            status: TopologyStatus::Creating,
            member_clusters: Vec::new(),
            primary_member: None,
            settings: request.settings.clone(),
        };

        let mut members = BTreeMap::new();
        if request.member_count.is_some() {
            for seq in 1..=member_count {
                let cluster_id = format!("{}-{:03}", id, seq);
                let role = if seq == 1 {
                    MemberRole::Primary
                } else {
                    MemberRole::Replica
                };
                members.insert(
                    cluster_id.clone(),
                    SimMember {
                        member: Member {
                            cluster_id,
                            replication_group_id: id.clone(),
                            role,
                            status: MemberStatus::Available,
                        },
                        pending: None,
                    },
                );
            }
        }

        let mut group = SimGroup {
            topology,
            members,
            pending: None,
        };
        group.begin(
            TopologyStatus::Creating,
            self.settle_polls,
            Some(TopologyStatus::Available),
        );
        let snapshot = group.snapshot();
        state.groups.insert(id, group);
        Ok(snapshot)
    }

    async fn delete_topology(
        &self,
        replication_group_id: &str,
        _final_snapshot_id: Option<&str>,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.state.lock().await;
        state
            .calls
            .push(Call::DeleteTopology(replication_group_id.to_string()));
        if let Some(err) = state.take_fault(Operation::DeleteTopology, replication_group_id) {
            return Err(err);
        }

        let settle_polls = self.settle_polls;
        let group = state.group_mut(replication_group_id)?;
        if group.topology.status == TopologyStatus::Deleting {
            return Ok(());
        }
        group.ensure_available()?;
        group.begin(TopologyStatus::Deleting, settle_polls, None);
        Ok(())
    }
}
