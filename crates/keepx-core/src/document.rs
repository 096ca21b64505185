//! The persistable database content and its structural mutations.

use crate::error::{Error, Result};
use crate::icons::MemoryIconStore;
use crate::id::NodeId;
use crate::models::{DeletedObject, Entry, Group, Meta};
use crate::recycle::{self, Disposition, Target};
use crate::tree::Tree;
use chrono::{DateTime, Utc};

/// Meta, tree, and deletion log: everything a storage backend persists.
#[derive(Debug, Clone)]
pub struct Document {
    pub meta: Meta,
    pub tree: Tree,
    /// Append-only tombstone log.
    pub deleted_objects: Vec<DeletedObject>,
    pub icons: MemoryIconStore,
}

impl Document {
    /// An empty document whose root group and database name are `name`.
    pub fn new(name: &str, now: DateTime<Utc>) -> Self {
        Self {
            meta: Meta::new(name, now),
            tree: Tree::new(Group::new(name, now)),
            deleted_objects: Vec::new(),
            icons: MemoryIconStore::default(),
        }
    }

    /// Create a group named `name` under `parent`.
    pub fn add_group(&mut self, parent: NodeId, name: &str, now: DateTime<Utc>) -> Result<NodeId> {
        self.tree.insert_group(parent, Group::new(name, now))
    }

    /// Create an entry titled `title` under `parent`.
    pub fn add_entry(&mut self, parent: NodeId, title: &str, now: DateTime<Utc>) -> Result<NodeId> {
        self.tree.insert_entry(parent, Entry::new(title, now))
    }

    fn tombstone(&mut self, id: NodeId, now: DateTime<Utc>) {
        self.deleted_objects.push(DeletedObject {
            id,
            deletion_time: now,
        });
    }

    /// Delete an entry, to the recycle bin unless `permanent` or the policy
    /// says otherwise. Returns what was done.
    pub fn delete_entry(
        &mut self,
        entry: NodeId,
        permanent: bool,
        now: DateTime<Utc>,
    ) -> Result<Disposition> {
        let parent = self
            .tree
            .entry(entry)
            .ok_or_else(|| Error::precondition(format!("entry {entry} not found")))?
            .parent;
        if parent.and_then(|p| self.tree.group(p)).is_none() {
            return Err(Error::precondition(format!("entry {entry} has no parent group")));
        }

        let disposition = recycle::decide(&self.tree, &self.meta, Target::Entry(entry), permanent);
        let slot = self.tree.detach_entry(entry)?;

        match disposition {
            Disposition::Permanent => {
                self.tree.remove_entry(entry)?;
                self.tombstone(entry, now);
            }
            Disposition::Recycle => {
                let attached = recycle::ensure(&mut self.tree, &mut self.meta, now)
                    .and_then(|bin| self.tree.attach_entry(entry, bin));
                if let Err(err) = attached {
                    tracing::warn!("Recycling entry {} failed, restoring it: {}", entry, err);
                    self.tree.restore_entry(entry, slot)?;
                    return Err(err);
                }
                self.touch_moved_entry(entry, now);
            }
        }
        tracing::info!("Deleted entry {} ({:?})", entry, disposition);
        Ok(disposition)
    }

    /// Delete a group and its contents, to the recycle bin unless
    /// `permanent` or the policy says otherwise.
    pub fn delete_group(
        &mut self,
        group: NodeId,
        permanent: bool,
        now: DateTime<Utc>,
    ) -> Result<Disposition> {
        let g = self
            .tree
            .group(group)
            .ok_or_else(|| Error::precondition(format!("group {group} not found")))?;
        if group == self.tree.root_id() || g.parent.is_none() || g.is_virtual {
            return Err(Error::precondition("root and virtual groups cannot be deleted"));
        }

        let disposition = recycle::decide(&self.tree, &self.meta, Target::Group(group), permanent);
        let slot = self.tree.detach_group(group)?;

        match disposition {
            Disposition::Permanent => {
                for id in self.tree.remove_group_subtree(group)? {
                    self.tombstone(id, now);
                }
            }
            Disposition::Recycle => {
                let attached = recycle::ensure(&mut self.tree, &mut self.meta, now)
                    .and_then(|bin| self.tree.attach_group(group, bin));
                if let Err(err) = attached {
                    tracing::warn!("Recycling group {} failed, restoring it: {}", group, err);
                    self.tree.restore_group(group, slot)?;
                    return Err(err);
                }
                self.touch_moved_group(group, now);
            }
        }
        tracing::info!("Deleted group {} ({:?})", group, disposition);
        Ok(disposition)
    }

    /// True if `src` is the root or an ancestor of `dst` below the root.
    ///
    /// The walk starts at `dst`'s parent, so a group is not its own parent.
    pub fn is_parent_group(&self, src: NodeId, dst: NodeId) -> Result<bool> {
        let root = self.tree.root_id();
        let dst_group = self
            .tree
            .group(dst)
            .ok_or_else(|| Error::precondition(format!("group {dst} not found")))?;
        if self.tree.group(src).is_none() {
            return Err(Error::precondition(format!("group {src} not found")));
        }
        if src == root {
            return Ok(true);
        }

        let mut current = dst_group.parent;
        while let Some(id) = current {
            if id == root {
                break;
            }
            if id == src {
                return Ok(true);
            }
            current = self.tree.group(id).and_then(|g| g.parent);
        }
        Ok(false)
    }

    /// Move an entry into `dst`. Returns `false` if it is already there.
    pub fn move_entry(&mut self, entry: NodeId, dst: NodeId, now: DateTime<Utc>) -> Result<bool> {
        let parent = self
            .tree
            .entry(entry)
            .ok_or_else(|| Error::precondition(format!("entry {entry} not found")))?
            .parent;
        if self.tree.group(dst).is_none() {
            return Err(Error::precondition(format!("group {dst} not found")));
        }
        if parent == Some(dst) {
            return Ok(false);
        }

        if parent.is_some() {
            self.tree.detach_entry(entry)?;
        }
        self.tree.attach_entry(entry, dst)?;
        self.touch_moved_entry(entry, now);
        tracing::info!("Moved entry {} to {}", entry, dst);
        Ok(true)
    }

    /// Move group `src` into `dst`.
    ///
    /// Returns `false` when `src` is `dst`, already sits in `dst`, or is an
    /// ancestor of `dst`; the tree is left unchanged.
    pub fn move_group(&mut self, src: NodeId, dst: NodeId, now: DateTime<Utc>) -> Result<bool> {
        let parent = self
            .tree
            .group(src)
            .ok_or_else(|| Error::precondition(format!("group {src} not found")))?
            .parent;
        if self.tree.group(dst).is_none() {
            return Err(Error::precondition(format!("group {dst} not found")));
        }
        if src == dst || parent == Some(dst) || self.is_parent_group(src, dst)? {
            tracing::debug!("Refusing to move group {} into {}", src, dst);
            return Ok(false);
        }

        let slot = self.tree.detach_group(src)?;
        if let Err(err) = self.tree.attach_group(src, dst) {
            self.tree.restore_group(src, slot)?;
            return Err(err);
        }
        self.touch_moved_group(src, now);
        tracing::info!("Moved group {} to {}", src, dst);
        Ok(true)
    }

    fn touch_moved_entry(&mut self, id: NodeId, now: DateTime<Utc>) {
        if let Some(e) = self.tree.entry_mut(id) {
            e.times.touch(now, true);
            e.times.location_changed = now;
        }
    }

    fn touch_moved_group(&mut self, id: NodeId, now: DateTime<Utc>) {
        if let Some(g) = self.tree.group_mut(id) {
            g.times.touch(now, true);
            g.times.location_changed = now;
        }
    }
}
