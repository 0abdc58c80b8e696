//! Validation of reconcile and create requests.
//!
//! Everything here runs before the first remote call, so a rejected request
//! leaves the replication group untouched.

use std::sync::LazyLock;

use crate::client::Topology;
use crate::controller::error::{Error, Result};
use crate::controller::provisioner::{GroupBlueprint, GroupLayout};

/// Maximum length of a replication group id
pub const MAX_REPLICATION_GROUP_ID_LENGTH: usize = 40;

/// Maximum number of days automatic snapshots are retained
pub const MAX_SNAPSHOT_RETENTION_LIMIT: u32 = 35;

/// Validate a replication group id and return it lower-cased.
///
/// Ids are 1 to 40 alphanumerics or hyphens, start with a letter, and contain
/// neither consecutive hyphens nor a trailing hyphen.
pub fn normalize_replication_group_id(id: &str) -> Result<String> {
    static ID_RE: LazyLock<Option<regex::Regex>> =
        LazyLock::new(|| regex::Regex::new(r"^[a-zA-Z][0-9a-zA-Z-]*$").ok());

    if id.is_empty() || id.len() > MAX_REPLICATION_GROUP_ID_LENGTH {
        return Err(Error::Validation(format!(
            "replication group id '{}' must be between 1 and {} characters",
            id, MAX_REPLICATION_GROUP_ID_LENGTH
        )));
    }
    if !ID_RE.as_ref().is_some_and(|re| re.is_match(id)) {
        return Err(Error::Validation(format!(
            "replication group id '{}' must begin with a letter and contain only alphanumeric characters and hyphens",
            id
        )));
    }
    if id.contains("--") {
        return Err(Error::Validation(format!(
            "replication group id '{}' cannot contain two consecutive hyphens",
            id
        )));
    }
    if id.ends_with('-') {
        return Err(Error::Validation(format!(
            "replication group id '{}' cannot end with a hyphen",
            id
        )));
    }
    Ok(id.to_lowercase())
}

fn validate_snapshot_retention(limit: u32) -> Result<()> {
    if limit > MAX_SNAPSHOT_RETENTION_LIMIT {
        return Err(Error::Validation(format!(
            "snapshot retention limit {} exceeds maximum {}",
            limit, MAX_SNAPSHOT_RETENTION_LIMIT
        )));
    }
    Ok(())
}

/// Validate an old/new topology pair handed to `reconcile`.
pub fn validate_reconcile(old: &Topology, new: &Topology) -> Result<()> {
    let id = normalize_replication_group_id(&new.replication_group_id)?;
    if normalize_replication_group_id(&old.replication_group_id)? != id {
        return Err(Error::Validation(format!(
            "replication group id cannot change ('{}' to '{}')",
            old.replication_group_id, new.replication_group_id
        )));
    }

    for (name, count) in [
        ("old member count", old.member_count),
        ("new member count", new.member_count),
        ("old shard count", old.shard_count),
        ("new shard count", new.shard_count),
    ] {
        if count < 1 {
            return Err(Error::Validation(format!("{} must be at least 1", name)));
        }
    }

    if old.member_count != new.member_count && old.shard_count != new.shard_count {
        return Err(Error::Validation(format!(
            "member count ({} to {}) and shard count ({} to {}) cannot change together",
            old.member_count, new.member_count, old.shard_count, new.shard_count
        )));
    }

    validate_snapshot_retention(new.settings.snapshot_retention_limit)
}

/// Validate a blueprint for a new replication group.
pub fn validate_blueprint(blueprint: &GroupBlueprint) -> Result<()> {
    normalize_replication_group_id(&blueprint.replication_group_id)?;

    match blueprint.layout {
        GroupLayout::Flat { member_count } if member_count < 1 => {
            return Err(Error::Validation(
                "member count must be at least 1".to_string(),
            ));
        }
        GroupLayout::Sharded { shard_count, .. } if shard_count < 1 => {
            return Err(Error::Validation(
                "shard count must be at least 1".to_string(),
            ));
        }
        _ => {}
    }

    // Restoring from snapshots needs an explicit slot layout.
    if !blueprint.snapshot_arns.is_empty()
        && !blueprint
            .node_group_layout
            .as_ref()
            .is_some_and(|layout| !layout.slots.is_empty())
    {
        return Err(Error::Validation(
            "snapshot ARNs require a node group configuration with slots".to_string(),
        ));
    }

    validate_snapshot_retention(blueprint.settings.snapshot_retention_limit)
}
