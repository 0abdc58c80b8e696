// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for replication-group-reconciler.
//!
//! Uses proptest to generate random inputs and verify invariants.

use std::collections::HashSet;

use proptest::prelude::*;

use replication_group_reconciler::client::{GroupSettings, Topology};
use replication_group_reconciler::controller::change_set::plan_modification;
use replication_group_reconciler::controller::decommissioner::RemovalState;
use replication_group_reconciler::controller::member_plan::{
    diff_members, diff_shards, member_id, node_groups_to_remove,
};
use replication_group_reconciler::controller::validation::normalize_replication_group_id;

/// Strategy for generating member or shard counts (1-90).
fn valid_count() -> impl Strategy<Value = u32> {
    1..=90u32
}

/// Strategy for generating valid replication group ids.
fn valid_group_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,8}(-[a-z0-9]{1,8}){0,2}"
}

/// Strategy for generating random removal states.
fn any_removal_state() -> impl Strategy<Value = RemovalState> {
    prop_oneof![
        Just(RemovalState::Requested),
        Just(RemovalState::PrimaryConflict),
        Just(RemovalState::Reassigning),
        Just(RemovalState::Retried),
        Just(RemovalState::Done),
        Just(RemovalState::Failed),
    ]
}

/// Strategy for generating general settings.
fn any_settings() -> impl Strategy<Value = GroupSettings> {
    (
        "[a-z ]{0,20}",
        any::<bool>(),
        proptest::option::of("cache\\.(m5|r6g)\\.(large|xlarge)"),
        proptest::option::of("[67]\\.[0-2]"),
        proptest::collection::vec("sg-[0-9a-f]{4}", 0..3),
        0..=35u32,
    )
        .prop_map(
            |(description, upgrade, node_type, engine_version, security_group_ids, retention)| {
                GroupSettings {
                    description,
                    auto_minor_version_upgrade: upgrade,
                    node_type,
                    engine_version,
                    security_group_ids,
                    snapshot_retention_limit: retention,
                    ..Default::default()
                }
            },
        )
}

proptest! {
    /// Adding or removing always brings the count to the target.
    #[test]
    fn member_diff_reaches_target(old in valid_count(), new in valid_count()) {
        let plan = diff_members(old, new, "cache");
        let after = old as i64 + plan.to_add.len() as i64 - plan.to_remove.len() as i64;
        prop_assert_eq!(after, new as i64);
        prop_assert!(plan.to_add.is_empty() || plan.to_remove.is_empty());
    }

    /// Equal counts produce an empty plan.
    #[test]
    fn equal_counts_are_noop(count in valid_count(), id in valid_group_id()) {
        prop_assert!(diff_members(count, count, &id).is_empty());
        prop_assert!(diff_shards(count, count).is_empty());
    }

    /// Removed members are exactly the highest sequence numbers, highest first.
    #[test]
    fn removal_takes_highest_first(old in valid_count(), new in valid_count()) {
        prop_assume!(new < old);
        let plan = diff_members(old, new, "cache");
        let expected: Vec<String> = (new + 1..=old).rev().map(|seq| member_id("cache", seq)).collect();
        prop_assert_eq!(plan.to_remove, expected);
    }

    /// Added ids never collide with existing ones.
    #[test]
    fn added_disjoint_from_existing(old in valid_count(), new in valid_count(), id in valid_group_id()) {
        let existing: HashSet<String> = (1..=old).map(|seq| member_id(&id, seq)).collect();
        let plan = diff_members(old, new, &id);
        prop_assert!(plan.to_add.iter().all(|m| !existing.contains(m)));
        prop_assert!(plan.to_remove.iter().all(|m| existing.contains(m)));
    }

    /// Member ids are `{id}-NNN` with a zero-padded sequence.
    #[test]
    fn member_ids_are_padded(id in valid_group_id(), seq in 1..=999u32) {
        let member = member_id(&id, seq);
        let suffix = member.strip_prefix(&format!("{id}-")).unwrap();
        prop_assert_eq!(suffix.len(), 3);
        prop_assert_eq!(suffix.parse::<u32>().unwrap(), seq);
    }

    /// Node groups to remove are four-digit ids in descending order.
    #[test]
    fn node_groups_descending(old in valid_count(), new in valid_count()) {
        let removed = node_groups_to_remove(old, new);
        prop_assert_eq!(removed.len() as u32, old.saturating_sub(new));
        prop_assert!(removed.iter().all(|g| g.len() == 4 && g.chars().all(|c| c.is_ascii_digit())));
        let seqs: Vec<u32> = removed.iter().map(|g| g.parse().unwrap()).collect();
        prop_assert!(seqs.windows(2).all(|w| w[0] > w[1]));
        prop_assert!(seqs.iter().all(|s| *s > new && *s <= old));
    }

    /// Identical desired and current state needs no modification.
    #[test]
    fn identical_settings_need_no_change(settings in any_settings(), failover in any::<bool>()) {
        let topology = Topology::flat("cache", 2)
            .with_automatic_failover(failover)
            .with_settings(settings);
        prop_assert_eq!(plan_modification(&topology, &topology), None);
    }

    /// Any change produced never sets a primary or an empty security group list.
    #[test]
    fn change_is_well_formed(old in any_settings(), new in any_settings()) {
        let old = Topology::flat("cache", 2).with_settings(old);
        let new = Topology::flat("cache", 2).with_settings(new);
        if let Some(change) = plan_modification(&old, &new) {
            prop_assert!(change.has_changes());
            prop_assert!(change.primary_cluster_id.is_none());
            prop_assert!(change.security_group_ids.as_ref().is_none_or(|ids| !ids.is_empty()));
            if change.snapshotting_cluster_id.is_some() {
                prop_assert_eq!(old.settings.snapshot_retention_limit, 0);
            }
        }
    }

    /// Normalizing a valid id is idempotent and lowercases it.
    #[test]
    fn normalize_is_idempotent(id in valid_group_id()) {
        let upper = id.to_uppercase();
        let normalized = normalize_replication_group_id(&upper).unwrap();
        prop_assert_eq!(&normalized, &id);
        prop_assert_eq!(normalize_replication_group_id(&normalized).unwrap(), normalized);
    }

    /// Terminal removal states never move on.
    #[test]
    fn terminal_states_are_final(from in any_removal_state(), to in any_removal_state()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition_to(to));
        }
        prop_assert!(!from.can_transition_to(from));
    }
}
