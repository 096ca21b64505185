//! Group/entry tree arena and traversal.
//!
//! Groups and entries are stored in id-keyed maps owned by the [`Tree`].
//! Parent links and child sequences are ids, so a group never holds a second
//! owning edge to its children. Every mutation updates the child sequence and
//! the parent link together.

use crate::error::{Error, Result};
use crate::id::NodeId;
use crate::models::{Entry, Group};
use std::collections::HashMap;

/// Position a node occupied in its parent's child sequence before detaching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub parent: NodeId,
    pub index: usize,
}

/// The group/entry tree of one database.
#[derive(Debug, Clone)]
pub struct Tree {
    root: NodeId,
    groups: HashMap<NodeId, Group>,
    entries: HashMap<NodeId, Entry>,
    #[cfg(test)]
    attach_fault: bool,
}

impl Tree {
    /// Create a tree holding only `root`.
    pub fn new(mut root: Group) -> Self {
        root.parent = None;
        root.groups.clear();
        root.entries.clear();
        let id = root.id;
        let mut groups = HashMap::new();
        groups.insert(id, root);
        Self {
            root: id,
            groups,
            entries: HashMap::new(),
            #[cfg(test)]
            attach_fault: false,
        }
    }

    /// Id of the root group.
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    /// The root group.
    pub fn root(&self) -> &Group {
        // The root is inserted by `new` and can never be detached or removed.
        &self.groups[&self.root]
    }

    /// Group by id.
    pub fn group(&self, id: NodeId) -> Option<&Group> {
        self.groups.get(&id)
    }

    /// Mutable group by id. Child sequences and parent links must only be
    /// changed through the tree's own operations.
    pub fn group_mut(&mut self, id: NodeId) -> Option<&mut Group> {
        self.groups.get_mut(&id)
    }

    /// Entry by id.
    pub fn entry(&self, id: NodeId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    /// Mutable entry by id; leave `parent` alone.
    pub fn entry_mut(&mut self, id: NodeId) -> Option<&mut Entry> {
        self.entries.get_mut(&id)
    }

    /// True if `id` names a group or an entry in this tree.
    pub fn contains(&self, id: NodeId) -> bool {
        self.groups.contains_key(&id) || self.entries.contains_key(&id)
    }

    /// Number of groups, root included.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of entries, recycled ones included.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Parent of a group or entry; `None` for the root and unknown ids.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        match self.groups.get(&id) {
            Some(g) => g.parent,
            None => self.entries.get(&id).and_then(|e| e.parent),
        }
    }

    /// Attach a new, childless group under `parent`.
    pub fn insert_group(&mut self, parent: NodeId, mut group: Group) -> Result<NodeId> {
        if !self.groups.contains_key(&parent) {
            return Err(Error::precondition(format!("parent group {parent} not found")));
        }
        if self.contains(group.id) {
            return Err(Error::duplicate_id(group.id));
        }
        if !group.is_empty() {
            return Err(Error::precondition("inserted groups must not list children"));
        }
        let id = group.id;
        group.parent = None;
        self.groups.insert(id, group);
        self.attach_group(id, parent)?;
        Ok(id)
    }

    /// Attach a new entry under `parent`.
    pub fn insert_entry(&mut self, parent: NodeId, mut entry: Entry) -> Result<NodeId> {
        if !self.groups.contains_key(&parent) {
            return Err(Error::precondition(format!("parent group {parent} not found")));
        }
        if self.contains(entry.id) {
            return Err(Error::duplicate_id(entry.id));
        }
        let id = entry.id;
        entry.parent = None;
        self.entries.insert(id, entry);
        self.attach_entry(id, parent)?;
        Ok(id)
    }

    /// Find a direct subgroup of `group` by exact name.
    ///
    /// `".."` names the parent of `group`, which is absent for the root.
    pub fn find_subgroup_by_name(&self, group: NodeId, name: &str) -> Option<NodeId> {
        let g = self.groups.get(&group)?;
        if name == ".." {
            return g.parent;
        }
        g.groups
            .iter()
            .copied()
            .find(|id| self.groups.get(id).is_some_and(|c| c.name == name))
    }

    /// Find a direct entry of `group` whose `Title` equals `title`.
    pub fn find_entry_by_title(&self, group: NodeId, title: &str) -> Option<NodeId> {
        let g = self.groups.get(&group)?;
        g.entries
            .iter()
            .copied()
            .find(|id| self.entries.get(id).is_some_and(|e| e.title() == title))
    }

    /// Find group `id` at or below `from`.
    ///
    /// Without `recursive`, only `from` itself and its direct subgroups match.
    pub fn find_group_by_id(&self, from: NodeId, id: NodeId, recursive: bool) -> Option<NodeId> {
        if !self.groups.contains_key(&from) || !self.groups.contains_key(&id) {
            return None;
        }
        if id == from {
            return Some(id);
        }
        let found = if recursive {
            self.is_contained_in(id, from)
        } else {
            self.groups[&id].parent == Some(from)
        };
        found.then_some(id)
    }

    /// Find entry `id` in `from` or, with `recursive`, anywhere below it.
    pub fn find_entry_by_id(&self, from: NodeId, id: NodeId, recursive: bool) -> Option<NodeId> {
        let entry = self.entries.get(&id)?;
        if !self.groups.contains_key(&from) {
            return None;
        }
        let found = if recursive {
            self.is_contained_in(id, from)
        } else {
            entry.parent == Some(from)
        };
        found.then_some(id)
    }

    /// All groups below `from` (excluding it) in pre-order.
    pub fn flatten_groups(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let Some(start) = self.groups.get(&from) else {
            return out;
        };
        let mut stack: Vec<NodeId> = start.groups.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(g) = self.groups.get(&id) {
                out.push(id);
                stack.extend(g.groups.iter().rev().copied());
            }
        }
        out
    }

    /// Entries of the given groups, group by group, in child order.
    pub fn flatten_entries(&self, groups: &[NodeId]) -> Vec<NodeId> {
        groups
            .iter()
            .filter_map(|id| self.groups.get(id))
            .flat_map(|g| g.entries.iter().copied())
            .collect()
    }

    /// Every entry in the tree: root entries first, then pre-order by group.
    pub fn all_entries(&self) -> Vec<NodeId> {
        let mut out = self.root().entries.clone();
        out.extend(self.flatten_entries(&self.flatten_groups(self.root)));
        out
    }

    /// True if `ancestor` is reached by walking parent links up from
    /// `candidate`. A node is not contained in itself.
    pub fn is_contained_in(&self, candidate: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.parent_of(candidate);
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            steps += 1;
            if steps > self.groups.len() {
                tracing::warn!("Parent chain of {} does not terminate", candidate);
                return false;
            }
            current = self.groups.get(&id).and_then(|g| g.parent);
        }
        false
    }

    /// Groups from the root down to `group`, inclusive.
    pub fn ancestry(&self, group: NodeId) -> Option<Vec<NodeId>> {
        self.groups.get(&group)?;
        let mut chain = vec![group];
        let mut current = self.groups[&group].parent;
        while let Some(id) = current {
            if chain.len() > self.groups.len() {
                return None;
            }
            chain.push(id);
            current = self.groups.get(&id).and_then(|g| g.parent);
        }
        chain.reverse();
        Some(chain)
    }

    /// Group names from the root down to `group`.
    pub fn path_of(&self, group: NodeId) -> Option<Vec<&str>> {
        self.ancestry(group)?
            .into_iter()
            .map(|id| self.groups.get(&id).map(|g| g.name.as_str()))
            .collect()
    }

    /// Unlink a group from its parent's child sequence.
    pub(crate) fn detach_group(&mut self, id: NodeId) -> Result<Slot> {
        let parent = self
            .groups
            .get(&id)
            .ok_or_else(|| Error::precondition(format!("group {id} not found")))?
            .parent
            .ok_or_else(|| Error::precondition("the root group cannot be detached"))?;
        let siblings = &mut self
            .groups
            .get_mut(&parent)
            .ok_or_else(|| Error::precondition(format!("parent group {parent} not found")))?
            .groups;
        let index = siblings
            .iter()
            .position(|c| *c == id)
            .ok_or_else(|| Error::precondition(format!("group {id} missing from its parent")))?;
        siblings.remove(index);
        if let Some(g) = self.groups.get_mut(&id) {
            g.parent = None;
        }
        Ok(Slot { parent, index })
    }

    /// Append a detached group to `parent`'s child sequence.
    pub(crate) fn attach_group(&mut self, id: NodeId, parent: NodeId) -> Result<()> {
        self.take_attach_fault(id)?;
        let len = self.groups.get(&parent).map_or(0, |g| g.groups.len());
        self.place_group(id, Slot { parent, index: len })
    }

    /// Put a detached group back where `detach_group` found it.
    pub(crate) fn restore_group(&mut self, id: NodeId, slot: Slot) -> Result<()> {
        self.place_group(id, slot)
    }

    fn place_group(&mut self, id: NodeId, slot: Slot) -> Result<()> {
        let child = self
            .groups
            .get(&id)
            .ok_or_else(|| Error::precondition(format!("group {id} not found")))?;
        if child.parent.is_some() {
            return Err(Error::precondition(format!("group {id} is still attached")));
        }
        if id == slot.parent || self.is_contained_in(slot.parent, id) {
            return Err(Error::precondition(format!(
                "group {id} cannot be placed inside itself"
            )));
        }
        let parent = self
            .groups
            .get_mut(&slot.parent)
            .ok_or_else(|| Error::precondition(format!("parent group {} not found", slot.parent)))?;
        if parent.groups.contains(&id) {
            return Err(Error::duplicate_id(id));
        }
        let index = slot.index.min(parent.groups.len());
        parent.groups.insert(index, id);
        if let Some(g) = self.groups.get_mut(&id) {
            g.parent = Some(slot.parent);
        }
        Ok(())
    }

    /// Unlink an entry from its parent's entry sequence.
    pub(crate) fn detach_entry(&mut self, id: NodeId) -> Result<Slot> {
        let parent = self
            .entries
            .get(&id)
            .ok_or_else(|| Error::precondition(format!("entry {id} not found")))?
            .parent
            .ok_or_else(|| Error::precondition(format!("entry {id} has no parent group")))?;
        let siblings = &mut self
            .groups
            .get_mut(&parent)
            .ok_or_else(|| Error::precondition(format!("parent group {parent} not found")))?
            .entries;
        let index = siblings
            .iter()
            .position(|c| *c == id)
            .ok_or_else(|| Error::precondition(format!("entry {id} missing from its parent")))?;
        siblings.remove(index);
        if let Some(e) = self.entries.get_mut(&id) {
            e.parent = None;
        }
        Ok(Slot { parent, index })
    }

    /// Append a detached entry to `parent`'s entry sequence.
    pub(crate) fn attach_entry(&mut self, id: NodeId, parent: NodeId) -> Result<()> {
        self.take_attach_fault(id)?;
        let len = self.groups.get(&parent).map_or(0, |g| g.entries.len());
        self.place_entry(id, Slot { parent, index: len })
    }

    /// Put a detached entry back where `detach_entry` found it.
    pub(crate) fn restore_entry(&mut self, id: NodeId, slot: Slot) -> Result<()> {
        self.place_entry(id, slot)
    }

    fn place_entry(&mut self, id: NodeId, slot: Slot) -> Result<()> {
        let entry = self
            .entries
            .get(&id)
            .ok_or_else(|| Error::precondition(format!("entry {id} not found")))?;
        if entry.parent.is_some() {
            return Err(Error::precondition(format!("entry {id} is still attached")));
        }
        let parent = self
            .groups
            .get_mut(&slot.parent)
            .ok_or_else(|| Error::precondition(format!("parent group {} not found", slot.parent)))?;
        if parent.entries.contains(&id) {
            return Err(Error::duplicate_id(id));
        }
        let index = slot.index.min(parent.entries.len());
        parent.entries.insert(index, id);
        if let Some(e) = self.entries.get_mut(&id) {
            e.parent = Some(slot.parent);
        }
        Ok(())
    }

    /// Make the next `attach_group` or `attach_entry` fail.
    #[cfg(test)]
    pub(crate) fn fail_next_attach(&mut self) {
        self.attach_fault = true;
    }

    #[cfg(test)]
    fn take_attach_fault(&mut self, id: NodeId) -> Result<()> {
        if std::mem::take(&mut self.attach_fault) {
            return Err(Error::duplicate_id(id));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn take_attach_fault(&mut self, _id: NodeId) -> Result<()> {
        Ok(())
    }

    /// Drop a detached group and everything below it.
    ///
    /// Returns the removed ids: each group's subgroups (recursively), then its
    /// entries, then the group itself.
    pub(crate) fn remove_group_subtree(&mut self, id: NodeId) -> Result<Vec<NodeId>> {
        let group = self
            .groups
            .get(&id)
            .ok_or_else(|| Error::precondition(format!("group {id} not found")))?;
        if group.parent.is_some() || id == self.root {
            return Err(Error::precondition("only detached groups can be removed"));
        }
        let mut removed = Vec::new();
        self.collect_removal(id, &mut removed);
        for node in &removed {
            if self.groups.remove(node).is_none() {
                self.entries.remove(node);
            }
        }
        Ok(removed)
    }

    fn collect_removal(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if let Some(g) = self.groups.get(&id) {
            for child in &g.groups {
                self.collect_removal(*child, out);
            }
            out.extend(g.entries.iter().copied());
            out.push(id);
        }
    }

    /// Drop a detached entry.
    pub(crate) fn remove_entry(&mut self, id: NodeId) -> Result<Entry> {
        let attached = self
            .entries
            .get(&id)
            .ok_or_else(|| Error::precondition(format!("entry {id} not found")))?
            .parent
            .is_some();
        if attached {
            return Err(Error::precondition("only detached entries can be removed"));
        }
        self.entries
            .remove(&id)
            .ok_or_else(|| Error::precondition(format!("entry {id} not found")))
    }

    /// Verify parent/child links agree in both directions and that every
    /// node is reachable from the root.
    pub fn check_consistency(&self) -> Result<()> {
        if self.root().parent.is_some() {
            return Err(Error::precondition("root group has a parent"));
        }
        let mut seen_groups = 1;
        let mut seen_entries = 0;
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            let g = &self.groups[&id];
            for child in &g.groups {
                let c = self
                    .groups
                    .get(child)
                    .ok_or_else(|| Error::precondition(format!("dangling group {child}")))?;
                if c.parent != Some(id) {
                    return Err(Error::precondition(format!(
                        "group {child} does not point back to {id}"
                    )));
                }
                seen_groups += 1;
                if seen_groups > self.groups.len() {
                    return Err(Error::precondition("group listed more than once"));
                }
                stack.push(*child);
            }
            for child in &g.entries {
                let e = self
                    .entries
                    .get(child)
                    .ok_or_else(|| Error::precondition(format!("dangling entry {child}")))?;
                if e.parent != Some(id) {
                    return Err(Error::precondition(format!(
                        "entry {child} does not point back to {id}"
                    )));
                }
                seen_entries += 1;
            }
        }
        if seen_groups != self.groups.len() || seen_entries != self.entries.len() {
            return Err(Error::precondition("unreachable nodes in tree"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    /// root -> A -> B, root -> C; entry "e1" in B.
    fn sample() -> (Tree, NodeId, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new(Group::new("root", now()));
        let root = tree.root_id();
        let a = tree.insert_group(root, Group::new("A", now())).unwrap();
        let b = tree.insert_group(a, Group::new("B", now())).unwrap();
        let c = tree.insert_group(root, Group::new("C", now())).unwrap();
        let e = tree.insert_entry(b, Entry::new("e1", now())).unwrap();
        (tree, a, b, c, e)
    }

    #[test]
    fn subgroup_lookup_and_dotdot() {
        let (tree, a, b, _, _) = sample();
        let root = tree.root_id();
        assert_eq!(tree.find_subgroup_by_name(root, "A"), Some(a));
        assert_eq!(tree.find_subgroup_by_name(a, "B"), Some(b));
        assert_eq!(tree.find_subgroup_by_name(b, ".."), Some(a));
        assert_eq!(tree.find_subgroup_by_name(root, ".."), None);
        assert_eq!(tree.find_subgroup_by_name(root, "B"), None);
    }

    #[test]
    fn entry_lookup_by_title() {
        let (tree, a, b, _, e) = sample();
        assert_eq!(tree.find_entry_by_title(b, "e1"), Some(e));
        assert_eq!(tree.find_entry_by_title(a, "e1"), None);
    }

    #[test]
    fn group_lookup_respects_recursion_flag() {
        let (tree, a, b, _, _) = sample();
        let root = tree.root_id();
        assert_eq!(tree.find_group_by_id(root, root, false), Some(root));
        assert_eq!(tree.find_group_by_id(root, a, false), Some(a));
        assert_eq!(tree.find_group_by_id(root, b, false), None);
        assert_eq!(tree.find_group_by_id(root, b, true), Some(b));
        assert_eq!(tree.find_group_by_id(b, a, true), None);
    }

    #[test]
    fn flatten_is_pre_order() {
        let (tree, a, b, c, e) = sample();
        assert_eq!(tree.flatten_groups(tree.root_id()), vec![a, b, c]);
        assert_eq!(tree.all_entries(), vec![e]);
    }

    #[test]
    fn containment_walks_parents() {
        let (tree, a, b, c, e) = sample();
        assert!(tree.is_contained_in(b, a));
        assert!(tree.is_contained_in(e, a));
        assert!(!tree.is_contained_in(a, a));
        assert!(!tree.is_contained_in(b, c));
        assert!(!tree.is_contained_in(tree.root_id(), a));
    }

    #[test]
    fn detach_and_restore_keeps_position() {
        let (mut tree, a, _, c, _) = sample();
        let root = tree.root_id();
        let slot = tree.detach_group(a).unwrap();
        assert_eq!(slot, Slot { parent: root, index: 0 });
        assert_eq!(tree.root().groups, vec![c]);
        tree.restore_group(a, slot).unwrap();
        assert_eq!(tree.root().groups, vec![a, c]);
        tree.check_consistency().unwrap();
    }

    #[test]
    fn attach_refuses_cycles() {
        let (mut tree, a, b, _, _) = sample();
        tree.detach_group(a).unwrap();
        let err = tree.attach_group(a, b).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let (mut tree, a, _, _, _) = sample();
        let root = tree.root_id();
        let dup = Group::with_id(a, "again", now());
        assert!(matches!(
            tree.insert_group(root, dup),
            Err(Error::DuplicateId { .. })
        ));
    }

    #[test]
    fn root_cannot_be_detached() {
        let (mut tree, _, _, _, _) = sample();
        let root = tree.root_id();
        assert!(tree.detach_group(root).unwrap_err().is_precondition());
    }

    #[test]
    fn subtree_removal_lists_contents_before_group() {
        let (mut tree, a, b, _, e) = sample();
        tree.detach_group(a).unwrap();
        let removed = tree.remove_group_subtree(a).unwrap();
        assert_eq!(removed, vec![e, b, a]);
        assert!(!tree.contains(b));
        assert!(!tree.contains(e));
        tree.check_consistency().unwrap();
    }

    #[test]
    fn ancestry_runs_from_root() {
        let (tree, a, b, _, _) = sample();
        assert_eq!(tree.ancestry(b), Some(vec![tree.root_id(), a, b]));
    }
}
