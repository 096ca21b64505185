//! Slash-delimited path resolution.
//!
//! Paths are relative to a cursor group unless they start with `/`, in which
//! case the first segment must be the root group's name. `..` ascends one
//! level; empty segments are skipped. The lone path `/` names the cursor.

use crate::id::NodeId;
use crate::tree::Tree;

const SEPARATOR: char = '/';

/// Starting group and the segments left to walk.
fn split<'p>(tree: &Tree, cursor: NodeId, path: &'p str) -> Option<(NodeId, Vec<&'p str>)> {
    let Some(rest) = path.strip_prefix(SEPARATOR) else {
        tree.group(cursor)?;
        return Some((cursor, path.split(SEPARATOR).collect()));
    };
    let mut segments = rest.split(SEPARATOR);
    if segments.next() != Some(tree.root().name.as_str()) {
        tracing::debug!("Absolute path {:?} does not start at the root group", path);
        return None;
    }
    Some((tree.root_id(), segments.collect()))
}

fn walk(tree: &Tree, start: NodeId, segments: &[&str]) -> Option<NodeId> {
    segments
        .iter()
        .filter(|s| !s.is_empty())
        .try_fold(start, |group, name| tree.find_subgroup_by_name(group, name))
}

/// Resolve `path` to a group.
pub fn resolve_group(tree: &Tree, cursor: NodeId, path: &str) -> Option<NodeId> {
    if path == "/" {
        return tree.group(cursor).map(|g| g.id);
    }
    let (start, segments) = split(tree, cursor, path)?;
    walk(tree, start, &segments)
}

/// Resolve `path` to an entry: every segment but the last names a group and
/// the last is an entry title in that group.
pub fn resolve_entry(tree: &Tree, cursor: NodeId, path: &str) -> Option<NodeId> {
    if path == "/" {
        return None;
    }
    let (start, segments) = split(tree, cursor, path)?;
    let (title, groups) = segments.split_last()?;
    if title.is_empty() {
        return None;
    }
    let group = walk(tree, start, groups)?;
    tree.find_entry_by_title(group, title)
}

/// `root/…/group/` for a group, every level followed by a separator.
pub fn display_path(tree: &Tree, group: NodeId) -> Option<String> {
    let chain = tree.ancestry(group)?;
    let mut path = String::new();
    for id in chain {
        path.push_str(&tree.group(id)?.name);
        path.push(SEPARATOR);
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entry, Group};
    use chrono::{TimeZone, Utc};

    struct Fixture {
        tree: Tree,
        general: NodeId,
        g1: NodeId,
        g21: NodeId,
        entry: NodeId,
    }

    fn fixture() -> Fixture {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut tree = Tree::new(Group::new("utdb", now));
        let root = tree.root_id();
        let general = tree.insert_group(root, Group::new("General", now)).unwrap();
        let g1 = tree.insert_group(general, Group::new("G1", now)).unwrap();
        let g21 = tree.insert_group(g1, Group::new("G21", now)).unwrap();
        let entry = tree.insert_entry(g21, Entry::new("G21E1", now)).unwrap();
        Fixture {
            tree,
            general,
            g1,
            g21,
            entry,
        }
    }

    #[test]
    fn relative_group_paths() {
        let f = fixture();
        let root = f.tree.root_id();
        assert_eq!(resolve_group(&f.tree, root, "General/G1/G21"), Some(f.g21));
        assert_eq!(resolve_group(&f.tree, root, "General/G1/G21/"), Some(f.g21));
        assert_eq!(resolve_group(&f.tree, root, "General//G1"), Some(f.g1));
        assert_eq!(resolve_group(&f.tree, f.general, "G1"), Some(f.g1));
        assert_eq!(resolve_group(&f.tree, root, "General/G1/G21/G21E1"), None);
    }

    #[test]
    fn absolute_paths_must_name_the_root() {
        let f = fixture();
        let root = f.tree.root_id();
        assert_eq!(resolve_group(&f.tree, f.g21, "/utdb"), Some(root));
        assert_eq!(resolve_group(&f.tree, f.g21, "/utdb/General/G1"), Some(f.g1));
        assert_eq!(resolve_group(&f.tree, root, "/G1/G21"), None);
        assert_eq!(resolve_group(&f.tree, root, "/utdbx/General"), None);
    }

    #[test]
    fn dotdot_ascends_and_stops_at_root() {
        let f = fixture();
        let root = f.tree.root_id();
        assert_eq!(resolve_group(&f.tree, f.g21, ".."), Some(f.g1));
        assert_eq!(resolve_group(&f.tree, f.g21, "../.."), Some(f.general));
        assert_eq!(resolve_group(&f.tree, f.g21, "../../../G1"), None);
        assert_eq!(resolve_group(&f.tree, root, ".."), None);
        assert_eq!(resolve_group(&f.tree, root, "../General"), None);
    }

    #[test]
    fn entry_paths() {
        let f = fixture();
        let root = f.tree.root_id();
        assert_eq!(resolve_entry(&f.tree, root, "General/G1/G21/G21E1"), Some(f.entry));
        assert_eq!(resolve_entry(&f.tree, root, "/utdb/General/G1/G21/G21E1"), Some(f.entry));
        assert_eq!(resolve_entry(&f.tree, f.g21, "G21E1"), Some(f.entry));
        assert_eq!(resolve_entry(&f.tree, f.g21, "../G21/G21E1"), Some(f.entry));
        assert_eq!(resolve_entry(&f.tree, root, "General/G1/G21E1"), None);
        assert_eq!(resolve_entry(&f.tree, root, "General/G1/G21/"), None);
    }

    #[test]
    fn bare_slash_is_the_cursor_for_groups_only() {
        let f = fixture();
        assert_eq!(resolve_group(&f.tree, f.g1, "/"), Some(f.g1));
        assert_eq!(resolve_entry(&f.tree, f.g1, "/"), None);
        assert_eq!(resolve_group(&f.tree, f.g1, ""), Some(f.g1));
        assert_eq!(resolve_entry(&f.tree, f.g1, ""), None);
    }

    #[test]
    fn display_path_is_root_inclusive() {
        let f = fixture();
        assert_eq!(
            display_path(&f.tree, f.g21).as_deref(),
            Some("utdb/General/G1/G21/")
        );
        assert_eq!(display_path(&f.tree, f.tree.root_id()).as_deref(), Some("utdb/"));
    }
}
