//! Member and node group identifiers to add or remove for a count change.
//!
//! Members of a flat replication group are named `{group}-NNN` and node groups
//! of a sharded one `NNNN`, both numbered from 1. Removal always starts from the
//! highest sequence number so a live topology never has gaps in the middle.

use serde::Serialize;

/// Identifiers to add and to remove for one count change.
///
/// At most one of the two lists is non-empty, since a count only moves in one
/// direction per call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationPlan {
    /// Ascending by sequence number.
    pub to_add: Vec<String>,
    /// Descending by sequence number.
    pub to_remove: Vec<String>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Member cluster id for sequence number `seq`.
pub fn member_id(base_id: &str, seq: u32) -> String {
    format!("{}-{:03}", base_id, seq)
}

/// Node group id for sequence number `seq`.
pub fn node_group_id(seq: u32) -> String {
    format!("{:04}", seq)
}

/// Compute the members to add or remove when going from `old_count` to
/// `new_count` members.
pub fn diff_members(old_count: u32, new_count: u32, base_id: &str) -> ReconciliationPlan {
    diff_by(old_count, new_count, |seq| member_id(base_id, seq))
}

/// Compute the node groups to add or remove when going from `old_count` to
/// `new_count` shards.
///
/// Added node groups are only informational: the control plane names new
/// groups itself.
pub fn diff_shards(old_count: u32, new_count: u32) -> ReconciliationPlan {
    diff_by(old_count, new_count, node_group_id)
}

/// Node group ids to remove when shrinking, highest first.
pub fn node_groups_to_remove(old_count: u32, new_count: u32) -> Vec<String> {
    diff_shards(old_count, new_count).to_remove
}

fn diff_by(old_count: u32, new_count: u32, name: impl Fn(u32) -> String) -> ReconciliationPlan {
    if new_count > old_count {
        ReconciliationPlan {
            to_add: (old_count + 1..=new_count).map(&name).collect(),
            to_remove: Vec::new(),
        }
    } else {
        ReconciliationPlan {
            to_add: Vec::new(),
            to_remove: (new_count + 1..=old_count).rev().map(&name).collect(),
        }
    }
}
