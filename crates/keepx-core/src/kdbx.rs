//! KDBX file backend built on the `keepass` crate.

use crate::document::Document;
use crate::icons::{CustomIcon, MemoryIconStore};
use crate::error::Result;
use crate::id::NodeId;
use crate::key::CompositeKey;
use crate::models::{DeletedObject, Entry, FieldValue, Group, Meta, Times};
use crate::status::{LogLevel, StatusLogger};
use crate::storage::Storage;
use crate::tree::Tree;
use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use keepass::config::DatabaseConfig;
use keepass::db::{CustomDataItem, Node, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A KDBX database file on disk.
///
/// The records read from the file are kept so that attributes the tree does
/// not model (history, auto-type, colours, tags) are written back unchanged.
pub struct KdbxFile {
    path: PathBuf,
    loaded: Option<keepass::Database>,
}

impl KdbxFile {
    /// A backend for the file at `path`. Nothing is read until `load`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            loaded: None,
        }
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, db: &keepass::Database, key: &CompositeKey) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;

        db.save(tmp.as_file_mut(), key.to_database_key())
            .with_context(|| "Failed to save database")?;

        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace database file: {}", self.path.display()))?;
        Ok(())
    }
}

impl Storage for KdbxFile {
    fn load(&mut self, key: &CompositeKey, logger: &mut dyn StatusLogger) -> Result<Document> {
        logger.set_text(&format!("Reading {}", self.path.display()), LogLevel::Info);
        let mut file = std::fs::File::open(&self.path)
            .with_context(|| format!("Failed to open database: {}", self.path.display()))?;

        let db = keepass::Database::open(&mut file, key.to_database_key())
            .with_context(|| format!("Failed to open database: {}", self.path.display()))?;

        logger.set_text("Building group tree", LogLevel::Info);
        let document = convert_database(&db)?;
        self.loaded = Some(db);
        Ok(document)
    }

    fn save(
        &mut self,
        document: &Document,
        key: &CompositeKey,
        logger: &mut dyn StatusLogger,
    ) -> Result<()> {
        let mut db = self
            .loaded
            .take()
            .unwrap_or_else(|| keepass::Database::new(DatabaseConfig::default()));

        let mut groups = HashMap::new();
        let mut entries = HashMap::new();
        let old_root = std::mem::replace(&mut db.root, keepass::db::Group::new(""));
        harvest(old_root, &mut groups, &mut entries);

        db.root = build_group(document, document.tree.root_id(), &mut groups, &mut entries);
        apply_meta(&mut db, document);
        db.deleted_objects.objects = document
            .deleted_objects
            .iter()
            .map(|d| keepass::db::DeletedObject {
                uuid: d.id.as_uuid(),
                deletion_time: d.deletion_time.naive_utc(),
            })
            .collect();

        logger.set_text(&format!("Writing {}", self.path.display()), LogLevel::Info);
        let result = self.write(&db, key);
        self.loaded = Some(db);
        result
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn to_utc(time: Option<&NaiveDateTime>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    time.map(|t| t.and_utc()).unwrap_or(fallback)
}

fn convert_times(kt: &keepass::db::Times, now: DateTime<Utc>) -> Times {
    let last_modification = to_utc(kt.get_last_modification(), now);
    Times {
        creation: to_utc(kt.get_creation(), last_modification),
        last_modification,
        last_access: to_utc(kt.get_last_access(), last_modification),
        location_changed: to_utc(kt.get_location_changed(), last_modification),
    }
}

fn write_times(kt: &mut keepass::db::Times, times: &Times) {
    kt.set_creation(times.creation.naive_utc());
    kt.set_last_modification(times.last_modification.naive_utc());
    kt.set_last_access(times.last_access.naive_utc());
    kt.set_location_changed(times.location_changed.naive_utc());
}

/// Convert a loaded keepass database into a document.
fn convert_database(db: &keepass::Database) -> Result<Document> {
    let now = Utc::now();
    let mut tree = Tree::new(convert_group(&db.root, now));
    let root = tree.root_id();
    insert_children(&mut tree, root, &db.root, now)?;

    let mut meta = Meta::new(
        db.meta
            .database_name
            .clone()
            .unwrap_or_else(|| db.root.name.clone()),
        now,
    );
    meta.recycle_bin_enabled = db.meta.recyclebin_enabled.unwrap_or(true);
    meta.recycle_bin_id = db
        .meta
        .recyclebin_uuid
        .map(NodeId::from)
        .unwrap_or(NodeId::ZERO);
    meta.recycle_bin_changed = to_utc(db.meta.recyclebin_changed.as_ref(), now);
    meta.master_key_changed = to_utc(db.meta.master_key_changed.as_ref(), now);
    meta.last_selected_group = db
        .meta
        .last_selected_group
        .map(NodeId::from)
        .unwrap_or(NodeId::ZERO);

    let mut icons = MemoryIconStore::default();
    for icon in &db.meta.custom_icons.icons {
        icons.insert(CustomIcon {
            id: icon.uuid.into(),
            name: String::new(),
            data: icon.data.clone(),
        });
    }

    let deleted_objects = db
        .deleted_objects
        .objects
        .iter()
        .map(|d| DeletedObject {
            id: d.uuid.into(),
            deletion_time: d.deletion_time.and_utc(),
        })
        .collect();

    tree.check_consistency()?;
    Ok(Document {
        meta,
        tree,
        deleted_objects,
        icons,
    })
}

fn insert_children(
    tree: &mut Tree,
    parent: NodeId,
    kg: &keepass::db::Group,
    now: DateTime<Utc>,
) -> Result<()> {
    for node in &kg.children {
        match node {
            Node::Group(g) => {
                let id = tree.insert_group(parent, convert_group(g, now))?;
                insert_children(tree, id, g, now)?;
            }
            Node::Entry(e) => {
                tree.insert_entry(parent, convert_entry(e, now))?;
            }
        }
    }
    Ok(())
}

/// Convert a keepass::Group (without children) to our Group model.
fn convert_group(kg: &keepass::db::Group, now: DateTime<Utc>) -> Group {
    let mut group = Group::with_id(kg.uuid.into(), kg.name.clone(), now);
    group.notes = kg.notes.clone().unwrap_or_default();
    if let Some(icon) = kg.icon_id {
        group.icon_id = icon;
    }
    group.custom_icon = kg.custom_icon_uuid.map(NodeId::from);
    group.expanded = kg.is_expanded;
    group.times = convert_times(&kg.times, now);
    group
}

/// Convert a keepass::Entry to our Entry model.
fn convert_entry(ke: &keepass::db::Entry, now: DateTime<Utc>) -> Entry {
    let mut entry = Entry::with_id(ke.uuid.into(), "", now);
    entry.fields.clear();

    for (key, val) in &ke.fields {
        match val {
            Value::Bytes(bytes) => {
                entry.binaries.insert(key.clone(), bytes.clone());
            }
            Value::Unprotected(s) => {
                entry.fields.insert(key.clone(), FieldValue::plain(s.clone()));
            }
            _ => {
                if let Some(s) = ke.get(key) {
                    entry.fields.insert(key.clone(), FieldValue::protected(s));
                } else {
                    tracing::warn!("Protected field {} of {} is unreadable", key, ke.uuid);
                }
            }
        }
    }

    for (key, item) in &ke.custom_data.items {
        match &item.value {
            Some(Value::Unprotected(s)) => {
                entry.custom_data.insert(key.clone(), s.clone());
            }
            // Left in the loaded record, see build_entry.
            _ => tracing::warn!("Custom data {} of {} is not plain text, skipping", key, ke.uuid),
        }
    }

    if let Some(icon) = ke.icon_id {
        entry.icon_id = icon;
    }
    entry.custom_icon = ke.custom_icon_uuid.map(NodeId::from);
    entry.times = convert_times(&ke.times, now);
    entry
}

/// Take a keepass group tree apart into records keyed by uuid.
fn harvest(
    mut kg: keepass::db::Group,
    groups: &mut HashMap<Uuid, keepass::db::Group>,
    entries: &mut HashMap<Uuid, keepass::db::Entry>,
) {
    for node in std::mem::take(&mut kg.children) {
        match node {
            Node::Group(g) => harvest(g, groups, entries),
            Node::Entry(e) => {
                entries.insert(e.uuid, e);
            }
        }
    }
    groups.insert(kg.uuid, kg);
}

/// Rebuild the keepass group for `id`, reusing the loaded record if any.
fn build_group(
    document: &Document,
    id: NodeId,
    groups: &mut HashMap<Uuid, keepass::db::Group>,
    entries: &mut HashMap<Uuid, keepass::db::Entry>,
) -> keepass::db::Group {
    let Some(group) = document.tree.group(id) else {
        return keepass::db::Group::new("");
    };
    let mut kg = groups
        .remove(&id.as_uuid())
        .unwrap_or_else(|| keepass::db::Group::new(&group.name));

    kg.uuid = id.as_uuid();
    kg.name = group.name.clone();
    kg.notes = (!group.notes.is_empty()).then(|| group.notes.clone());
    kg.icon_id = Some(group.icon_id);
    kg.custom_icon_uuid = group.custom_icon.map(NodeId::as_uuid);
    kg.is_expanded = group.expanded;
    write_times(&mut kg.times, &group.times);

    kg.children = Vec::with_capacity(group.groups.len() + group.entries.len());
    for child in &group.groups {
        kg.children
            .push(Node::Group(build_group(document, *child, groups, entries)));
    }
    for child in &group.entries {
        if let Some(entry) = document.tree.entry(*child) {
            kg.children.push(Node::Entry(build_entry(entry, entries)));
        }
    }
    kg
}

fn build_entry(
    entry: &Entry,
    entries: &mut HashMap<Uuid, keepass::db::Entry>,
) -> keepass::db::Entry {
    let mut ke = entries
        .remove(&entry.id.as_uuid())
        .unwrap_or_else(keepass::db::Entry::new);

    ke.uuid = entry.id.as_uuid();
    ke.fields.clear();
    for (name, field) in &entry.fields {
        let value = if field.protected {
            Value::Protected(field.value.as_bytes().into())
        } else {
            Value::Unprotected(field.value.clone())
        };
        ke.fields.insert(name.clone(), value);
    }
    for (name, data) in &entry.binaries {
        ke.fields.insert(name.clone(), Value::Bytes(data.clone()));
    }

    // Items that are not plain text are not modelled and stay as loaded.
    ke.custom_data
        .items
        .retain(|_, item| !matches!(item.value, Some(Value::Unprotected(_))));
    for (k, v) in &entry.custom_data {
        ke.custom_data.items.insert(
            k.clone(),
            CustomDataItem {
                value: Some(Value::Unprotected(v.clone())),
                last_modification_time: None,
            },
        );
    }

    ke.icon_id = Some(entry.icon_id);
    ke.custom_icon_uuid = entry.custom_icon.map(NodeId::as_uuid);
    write_times(&mut ke.times, &entry.times);
    ke
}

fn set_id(slot: &mut Option<Uuid>, id: NodeId) {
    *slot = (!id.is_zero()).then(|| id.as_uuid());
}

fn apply_meta(db: &mut keepass::Database, document: &Document) {
    let meta = &document.meta;
    db.meta.database_name = Some(meta.name.clone());
    db.meta.recyclebin_enabled = Some(meta.recycle_bin_enabled);
    set_id(&mut db.meta.recyclebin_uuid, meta.recycle_bin_id);
    db.meta.recyclebin_changed = Some(meta.recycle_bin_changed.naive_utc());
    db.meta.master_key_changed = Some(meta.master_key_changed.naive_utc());
    set_id(&mut db.meta.last_selected_group, meta.last_selected_group);

    // The store holds every icon read from the file, so it replaces the list.
    db.meta.custom_icons.icons = document
        .icons
        .iter()
        .map(|icon| keepass::db::Icon {
            uuid: icon.id.as_uuid(),
            data: icon.data.clone(),
        })
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::icons::CustomIconStore;
    use crate::models::{PASSWORD_FIELD, USERNAME_FIELD};
    use crate::status::TracingStatusLogger;
    use chrono::{Duration, TimeZone};

    #[test]
    fn save_and_reload_keeps_tree_bin_and_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utdb.kdbx");
        let key = CompositeKey::from_password("12345");
        let mut logger = TracingStatusLogger::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();

        let mut doc = Document::new("utdb", now);
        let root = doc.tree.root_id();
        let general = doc.add_group(root, "General", now).unwrap();
        let mut entry = Entry::new("G1E1", now);
        entry.set(USERNAME_FIELD, "alice");
        entry.set(PASSWORD_FIELD, "hunter2");
        entry
            .custom_data
            .insert("PassXYZ_OTP_Url".into(), "otpauth://totp/x".into());
        let entry = doc.tree.insert_entry(general, entry).unwrap();
        let gone = doc.add_entry(root, "gone", now).unwrap();
        doc.delete_entry(gone, true, now).unwrap();
        doc.delete_entry(entry, false, now).unwrap();

        let mut file = KdbxFile::new(&path);
        file.save(&doc, &key, &mut logger).unwrap();

        let mut reopened = KdbxFile::new(&path);
        let loaded = reopened.load(&key, &mut logger).unwrap();
        assert_eq!(loaded.meta.name, "utdb");
        assert_eq!(loaded.meta.recycle_bin_id, doc.meta.recycle_bin_id);
        assert_eq!(loaded.tree.root_id(), root);

        let e = loaded.tree.entry(entry).unwrap();
        assert_eq!(e.parent, Some(doc.meta.recycle_bin_id));
        assert_eq!(e.username(), "alice");
        assert_eq!(e.password(), "hunter2");
        assert!(e.fields[PASSWORD_FIELD].protected);
        assert_eq!(e.property("PassXYZ_OTP_Url"), Some("otpauth://totp/x"));
        assert_eq!(
            loaded.deleted_objects.iter().map(|d| d.id).collect::<Vec<_>>(),
            vec![gone]
        );
        loaded.tree.check_consistency().unwrap();

        let wrong = CompositeKey::from_password("nope");
        assert!(KdbxFile::new(&path).load(&wrong, &mut logger).is_err());
    }

    #[test]
    fn meta_cursor_and_icons_survive_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.kdbx");
        let key = CompositeKey::from_password("12345");
        let mut logger = TracingStatusLogger::new();
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();

        let mut doc = Document::new("utdb", now);
        let root = doc.tree.root_id();
        let general = doc.add_group(root, "General", now).unwrap();
        let entry = doc.add_entry(general, "github", now).unwrap();
        let icon = doc
            .icons
            .save_custom_icon(vec![0x89, b'P', b'N', b'G'], "github")
            .unwrap();
        doc.tree.entry_mut(entry).unwrap().custom_icon = Some(icon);
        doc.tree.group_mut(general).unwrap().custom_icon = Some(icon);
        doc.meta.last_selected_group = general;
        doc.meta.master_key_changed = now + Duration::hours(1);
        doc.meta.recycle_bin_changed = now + Duration::hours(2);

        KdbxFile::new(&path).save(&doc, &key, &mut logger).unwrap();
        let loaded = KdbxFile::new(&path).load(&key, &mut logger).unwrap();

        assert_eq!(loaded.meta.last_selected_group, general);
        assert_eq!(loaded.meta.master_key_changed, now + Duration::hours(1));
        assert_eq!(loaded.meta.recycle_bin_changed, now + Duration::hours(2));
        assert_eq!(loaded.tree.entry(entry).unwrap().custom_icon, Some(icon));
        assert_eq!(loaded.tree.group(general).unwrap().custom_icon, Some(icon));
        assert_eq!(loaded.icons.len(), 1);
        assert_eq!(
            loaded.icons.custom_icon(icon).unwrap().data,
            vec![0x89, b'P', b'N', b'G']
        );
    }

    #[test]
    fn protected_custom_data_stays_in_the_record() {
        let now = Utc::now();
        let mut ke = keepass::db::Entry::new();
        let item = |value| CustomDataItem {
            value: Some(value),
            last_modification_time: None,
        };
        ke.custom_data
            .items
            .insert("secret".into(), item(Value::Protected("s3cret".as_bytes().into())));
        ke.custom_data
            .items
            .insert("plain".into(), item(Value::Unprotected("v".into())));

        let mut entry = convert_entry(&ke, now);
        assert_eq!(entry.property("plain"), Some("v"));
        assert!(!entry.custom_data.contains_key("secret"));

        entry.custom_data.remove("plain");
        entry.custom_data.insert("added".into(), "a".into());
        let mut records = HashMap::from([(ke.uuid, ke)]);
        let rebuilt = build_entry(&entry, &mut records);

        let mut keys: Vec<&str> = rebuilt.custom_data.items.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["added", "secret"]);
        assert!(matches!(
            rebuilt.custom_data.items["secret"].value,
            Some(Value::Protected(_))
        ));
    }

    #[test]
    fn unset_cursor_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("root.kdbx");
        let key = CompositeKey::from_password("12345");
        let mut logger = TracingStatusLogger::new();
        let doc = Document::new("utdb", Utc::now());

        let mut file = KdbxFile::new(&path);
        file.save(&doc, &key, &mut logger).unwrap();
        let saved = file.loaded.as_ref().unwrap();
        assert_eq!(saved.meta.last_selected_group, None);
        assert_eq!(saved.meta.recyclebin_uuid, None);
        assert!(saved.meta.custom_icons.icons.is_empty());

        let loaded = KdbxFile::new(&path).load(&key, &mut logger).unwrap();
        assert!(loaded.meta.last_selected_group.is_zero());
        assert!(loaded.icons.is_empty());
    }
}
