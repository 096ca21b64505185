//! Database handle: lifecycle, cursor, and the public tree operations.

use crate::clock::{Clock, SystemClock};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::icons::{CustomIcon, CustomIconStore};
use crate::id::NodeId;
use crate::key::CompositeKey;
use crate::models::{DeletedObject, Entry, Group, Meta, OTP_URL_PROPERTY};
use crate::path;
use crate::recycle::{self, Disposition};
use crate::search::{self, SearchHit};
use crate::status::StatusLogger;
use crate::storage::Storage;
use crate::tree::Tree;
use std::sync::Arc;

/// An open (or closed) password database.
///
/// The handle owns the tree, the master key, and the storage backend it was
/// opened from. It is not synchronized; callers that share it across threads
/// must serialize access themselves.
pub struct Database {
    doc: Option<Document>,
    key: Option<CompositeKey>,
    storage: Option<Box<dyn Storage>>,
    clock: Arc<dyn Clock>,
    modified: bool,
}

impl Database {
    /// Create a new, empty database whose root group is named `name`.
    pub fn create(name: &str, key: CompositeKey) -> Self {
        Self::create_with_clock(name, key, Arc::new(SystemClock))
    }

    /// Like [`Database::create`], with timestamps taken from `clock`.
    pub fn create_with_clock(name: &str, key: CompositeKey, clock: Arc<dyn Clock>) -> Self {
        let doc = Document::new(name, clock.now());
        tracing::info!("Created database {}", name);
        Self::from_document(doc, key, clock)
    }

    /// Wrap an existing document.
    pub fn from_document(mut doc: Document, key: CompositeKey, clock: Arc<dyn Clock>) -> Self {
        normalize_cursor(&mut doc);
        Self {
            doc: Some(doc),
            key: Some(key),
            storage: None,
            clock,
            modified: false,
        }
    }

    /// Open a database from `storage` and unlock it with `key`.
    pub fn open(
        mut storage: Box<dyn Storage>,
        key: CompositeKey,
        logger: &mut dyn StatusLogger,
    ) -> Result<Self> {
        logger.start_logging(&format!("Opening {}", storage.describe()), true);
        let loaded = storage.load(&key, logger);
        logger.end_logging();

        let mut doc = loaded?;
        normalize_cursor(&mut doc);
        tracing::info!(
            "Opened database {} ({} groups, {} entries)",
            doc.meta.name,
            doc.tree.group_count(),
            doc.tree.entry_count()
        );
        Ok(Self {
            doc: Some(doc),
            key: Some(key),
            storage: Some(storage),
            clock: Arc::new(SystemClock),
            modified: false,
        })
    }

    /// Replace the time source used for new timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bind the database to a (new) storage backend.
    pub fn set_storage(&mut self, storage: Box<dyn Storage>) {
        tracing::debug!("Database bound to {}", storage.describe());
        self.storage = Some(storage);
    }

    /// Write the database to its storage backend.
    pub fn save(&mut self, logger: &mut dyn StatusLogger) -> Result<()> {
        let (Some(doc), Some(key)) = (self.doc.as_ref(), self.key.as_ref()) else {
            return Err(Error::Closed);
        };
        let storage = self.storage.as_mut().ok_or(Error::NoStorage)?;

        logger.start_logging(&format!("Saving {}", storage.describe()), true);
        let result = storage.save(doc, key, logger);
        logger.end_logging();
        result?;

        tracing::info!("Saved database {}", doc.meta.name);
        self.modified = false;
        Ok(())
    }

    /// Close the database and drop the master key.
    pub fn close(&mut self) {
        if let Some(doc) = self.doc.take() {
            tracing::info!("Closed database {}", doc.meta.name);
        }
        self.key = None;
        self.storage = None;
        self.modified = false;
    }

    /// False once [`Database::close`] has run.
    pub fn is_open(&self) -> bool {
        self.doc.is_some()
    }

    /// True when there are changes not yet saved.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Replace the master key used by the next save.
    pub fn change_master_key(&mut self, key: CompositeKey) -> Result<()> {
        let now = self.clock.now();
        let doc = self.doc.as_mut().ok_or(Error::Closed)?;
        doc.meta.master_key_changed = now;
        self.key = Some(key);
        self.modified = true;
        tracing::info!("Master key changed");
        Ok(())
    }

    /// The underlying document, `None` when closed.
    pub fn document(&self) -> Option<&Document> {
        self.doc.as_ref()
    }

    /// The group tree, `None` when closed.
    pub fn tree(&self) -> Option<&Tree> {
        self.doc.as_ref().map(|d| &d.tree)
    }

    /// Database metadata, `None` when closed.
    pub fn meta(&self) -> Option<&Meta> {
        self.doc.as_ref().map(|d| &d.meta)
    }

    /// Database name.
    pub fn name(&self) -> Option<&str> {
        self.meta().map(|m| m.name.as_str())
    }

    /// The root group.
    pub fn root_group(&self) -> Option<&Group> {
        self.tree().map(Tree::root)
    }

    /// Group by id, wherever it sits in the tree.
    pub fn group(&self, id: NodeId) -> Option<&Group> {
        self.tree()?.group(id)
    }

    /// Entry by id, wherever it sits in the tree.
    pub fn entry(&self, id: NodeId) -> Option<&Entry> {
        self.tree()?.entry(id)
    }

    fn doc(&self) -> Result<&Document> {
        self.doc.as_ref().ok_or(Error::Closed)
    }

    fn doc_mut(&mut self) -> Result<&mut Document> {
        self.doc.as_mut().ok_or(Error::Closed)
    }

    // Cursor

    /// The current group. Falls back to the root when the stored cursor is
    /// unset or no longer resolves.
    pub fn current_group(&self) -> Result<NodeId> {
        let doc = self.doc()?;
        Ok(resolve_cursor(doc))
    }

    /// Move the cursor to `group`.
    pub fn set_current_group(&mut self, group: NodeId) -> Result<()> {
        let doc = self.doc_mut()?;
        let root = doc.tree.root_id();
        if group.is_zero() || doc.tree.find_group_by_id(root, group, true).is_none() {
            return Err(Error::precondition(format!("group {group} not found")));
        }
        doc.meta.last_selected_group = group;
        Ok(())
    }

    /// `root/…/current/` for the current group, or empty when closed.
    pub fn current_path(&self) -> String {
        self.doc
            .as_ref()
            .and_then(|doc| path::display_path(&doc.tree, resolve_cursor(doc)))
            .unwrap_or_default()
    }

    /// Resolve a group path relative to the current group.
    pub fn find_group_by_path(&self, path: &str) -> Option<NodeId> {
        let doc = self.doc.as_ref()?;
        path::resolve_group(&doc.tree, resolve_cursor(doc), path)
    }

    /// Resolve an entry path relative to the current group.
    pub fn find_entry_by_path(&self, path: &str) -> Option<NodeId> {
        let doc = self.doc.as_ref()?;
        path::resolve_entry(&doc.tree, resolve_cursor(doc), path)
    }

    // Lookups

    /// Find a group anywhere in the tree.
    pub fn find_group_by_id(&self, id: NodeId) -> Option<NodeId> {
        let tree = self.tree()?;
        tree.find_group_by_id(tree.root_id(), id, true)
    }

    /// Find an entry anywhere in the tree, recycle bin included.
    pub fn find_entry_by_id(&self, id: NodeId) -> Option<NodeId> {
        let tree = self.tree()?;
        tree.find_entry_by_id(tree.root_id(), id, true)
    }

    /// Every entry, root entries first and then group by group in pre-order.
    pub fn all_entries(&self) -> Vec<&Entry> {
        let Some(tree) = self.tree() else {
            return Vec::new();
        };
        tree.all_entries()
            .into_iter()
            .filter_map(|id| tree.entry(id))
            .collect()
    }

    /// Entries carrying a non-blank custom data value under `name`.
    pub fn entries_with_property(&self, name: &str) -> Vec<&Entry> {
        self.all_entries()
            .into_iter()
            .filter(|e| e.property(name).is_some())
            .collect()
    }

    /// Entries with an OTP provisioning URL.
    pub fn otp_entries(&self) -> Vec<&Entry> {
        self.entries_with_property(OTP_URL_PROPERTY)
    }

    /// Search entries below `scope` (the root when `None`).
    pub fn search_entries(&self, query: &str, scope: Option<NodeId>) -> Vec<NodeId> {
        let Some(doc) = self.doc.as_ref() else {
            return Vec::new();
        };
        search::search_entries(doc, query, scope.unwrap_or(doc.tree.root_id()))
    }

    /// Fuzzy-rank entries against `query`, best first.
    pub fn fuzzy_search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        self.doc
            .as_ref()
            .map(|doc| search::fuzzy_search(doc, query, limit))
            .unwrap_or_default()
    }

    /// The recycle bin, if it has been created.
    pub fn recycle_bin(&self) -> Option<NodeId> {
        let doc = self.doc.as_ref()?;
        recycle::locate(&doc.tree, &doc.meta)
    }

    /// Turn the recycle bin on or off for later deletes. An existing bin is
    /// kept either way.
    pub fn set_recycle_bin_enabled(&mut self, enabled: bool) -> Result<()> {
        self.doc_mut()?.meta.recycle_bin_enabled = enabled;
        self.modified = true;
        Ok(())
    }

    /// Tombstones of permanently deleted nodes, oldest first.
    pub fn deleted_objects(&self) -> &[DeletedObject] {
        self.doc
            .as_ref()
            .map(|d| d.deleted_objects.as_slice())
            .unwrap_or_default()
    }

    /// Custom icon by id; `None` for `NodeId::ZERO` or an unknown id.
    pub fn custom_icon(&self, id: NodeId) -> Option<&CustomIcon> {
        self.doc.as_ref()?.icons.custom_icon(id)
    }

    /// First custom icon registered under `name`.
    pub fn custom_icon_by_name(&self, name: &str) -> Option<&CustomIcon> {
        self.doc.as_ref()?.icons.custom_icon_by_name(name)
    }

    /// Register a custom icon; `None` for an empty blob.
    pub fn save_custom_icon(&mut self, data: Vec<u8>, name: &str) -> Result<Option<NodeId>> {
        let id = self.doc_mut()?.icons.save_custom_icon(data, name);
        if id.is_some() {
            self.modified = true;
        }
        Ok(id)
    }

    // Mutations

    /// Create a group named `name` under `parent` and return its id.
    pub fn add_group(&mut self, parent: NodeId, name: &str) -> Result<NodeId> {
        let now = self.clock.now();
        let id = self.doc_mut()?.add_group(parent, name, now)?;
        self.modified = true;
        Ok(id)
    }

    /// Create an entry titled `title` under `parent` and return its id.
    pub fn add_entry(&mut self, parent: NodeId, title: &str) -> Result<NodeId> {
        let now = self.clock.now();
        let id = self.doc_mut()?.add_entry(parent, title, now)?;
        self.modified = true;
        Ok(id)
    }

    /// Rename a group and record the modification.
    pub fn rename_group(&mut self, id: NodeId, name: &str) -> Result<()> {
        let now = self.clock.now();
        let group = self
            .doc_mut()?
            .tree
            .group_mut(id)
            .ok_or_else(|| Error::precondition(format!("group {id} not found")))?;
        group.name = name.to_string();
        group.times.touch(now, true);
        self.modified = true;
        Ok(())
    }

    /// Apply `update` to an entry and record the modification.
    pub fn update_entry(&mut self, id: NodeId, update: impl FnOnce(&mut Entry)) -> Result<()> {
        let now = self.clock.now();
        let entry = self
            .doc_mut()?
            .tree
            .entry_mut(id)
            .ok_or_else(|| Error::precondition(format!("entry {id} not found")))?;
        update(entry);
        entry.times.touch(now, true);
        self.modified = true;
        Ok(())
    }

    /// Delete an entry; see [`Document::delete_entry`].
    pub fn delete_entry(&mut self, id: NodeId, permanent: bool) -> Result<Disposition> {
        let now = self.clock.now();
        let disposition = self.doc_mut()?.delete_entry(id, permanent, now)?;
        self.modified = true;
        Ok(disposition)
    }

    /// Delete a group and its contents; see [`Document::delete_group`].
    pub fn delete_group(&mut self, id: NodeId, permanent: bool) -> Result<Disposition> {
        let now = self.clock.now();
        let doc = self.doc_mut()?;
        let disposition = doc.delete_group(id, permanent, now)?;
        normalize_cursor(doc);
        self.modified = true;
        Ok(disposition)
    }

    /// See [`Document::is_parent_group`].
    pub fn is_parent_group(&self, src: NodeId, dst: NodeId) -> Result<bool> {
        self.doc()?.is_parent_group(src, dst)
    }

    /// Move an entry into `dst`. Returns false when it is already there.
    pub fn move_entry(&mut self, id: NodeId, dst: NodeId) -> Result<bool> {
        let now = self.clock.now();
        let moved = self.doc_mut()?.move_entry(id, dst, now)?;
        self.modified |= moved;
        Ok(moved)
    }

    /// Move group `src` into `dst`; see [`Document::move_group`] for when
    /// the move is refused.
    pub fn move_group(&mut self, src: NodeId, dst: NodeId) -> Result<bool> {
        let now = self.clock.now();
        let moved = self.doc_mut()?.move_group(src, dst, now)?;
        self.modified |= moved;
        Ok(moved)
    }
}

fn resolve_cursor(doc: &Document) -> NodeId {
    let root = doc.tree.root_id();
    let cursor = doc.meta.last_selected_group;
    if cursor.is_zero() || cursor == root {
        return root;
    }
    doc.tree
        .find_group_by_id(root, cursor, true)
        .unwrap_or(root)
}

/// Store the resolved cursor so it always names a live group.
fn normalize_cursor(doc: &mut Document) {
    let resolved = resolve_cursor(doc);
    if resolved != doc.meta.last_selected_group {
        tracing::debug!("Cursor reset to group {}", resolved);
        doc.meta.last_selected_group = resolved;
    }
}
