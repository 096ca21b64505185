//! Recycle-bin policy: permanent delete versus relocation to the bin.

use crate::error::Result;
use crate::id::NodeId;
use crate::models::{Group, Meta};
use crate::tree::Tree;
use chrono::{DateTime, Utc};

/// Display name of a lazily created recycle bin.
pub const RECYCLE_BIN_NAME: &str = "Recycle Bin";

/// Standard trash icon index.
pub const RECYCLE_BIN_ICON: usize = 43;

/// What a delete request does to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Unlink, destroy, and tombstone.
    Permanent,
    /// Re-parent into the recycle bin.
    Recycle,
}

/// The node a delete request is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Entry(NodeId),
    Group(NodeId),
}

/// The recycle bin group, when `meta` names one that exists under the root.
pub fn locate(tree: &Tree, meta: &Meta) -> Option<NodeId> {
    if meta.recycle_bin_id.is_zero() || meta.recycle_bin_id == tree.root_id() {
        return None;
    }
    tree.find_group_by_id(tree.root_id(), meta.recycle_bin_id, true)
}

/// Decide how to delete `target`.
///
/// Anything already inside the bin, the bin itself, and any group holding
/// the bin are destroyed outright; so is everything when the bin is disabled
/// or the caller asks for it. A bin that does not exist yet is created later
/// by [`ensure`].
pub fn decide(tree: &Tree, meta: &Meta, target: Target, requested_permanent: bool) -> Disposition {
    if requested_permanent || !meta.recycle_bin_enabled {
        return Disposition::Permanent;
    }
    let Some(bin) = locate(tree, meta) else {
        return Disposition::Recycle;
    };
    let permanent = match target {
        Target::Entry(id) => tree.is_contained_in(id, bin),
        Target::Group(id) => {
            id == bin || tree.is_contained_in(id, bin) || tree.is_contained_in(bin, id)
        }
    };
    if permanent {
        Disposition::Permanent
    } else {
        Disposition::Recycle
    }
}

/// Return the recycle bin, creating it under the root when `meta` does not
/// resolve to one.
pub fn ensure(tree: &mut Tree, meta: &mut Meta, now: DateTime<Utc>) -> Result<NodeId> {
    if meta.recycle_bin_id == tree.root_id() {
        tracing::warn!("Recycle bin id points at the root group; creating a new bin");
    } else if let Some(bin) = locate(tree, meta) {
        return Ok(bin);
    }

    let mut bin = Group::new(RECYCLE_BIN_NAME, now);
    bin.icon_id = RECYCLE_BIN_ICON;
    bin.enable_searching = Some(false);
    bin.expanded = false;
    let root = tree.root_id();
    let id = tree.insert_group(root, bin)?;

    meta.recycle_bin_id = id;
    meta.recycle_bin_changed = now;
    tracing::info!("Created recycle bin {}", id);
    Ok(id)
}
