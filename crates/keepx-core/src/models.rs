//! Shared data types for the vault tree.

use crate::id::NodeId;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub const TITLE_FIELD: &str = "Title";
pub const USERNAME_FIELD: &str = "UserName";
pub const PASSWORD_FIELD: &str = "Password";
pub const URL_FIELD: &str = "URL";
pub const NOTES_FIELD: &str = "Notes";

/// Standard field names, in display order.
pub const STANDARD_FIELDS: [&str; 5] = [
    TITLE_FIELD,
    USERNAME_FIELD,
    PASSWORD_FIELD,
    URL_FIELD,
    NOTES_FIELD,
];

/// Custom data key holding an entry's OTP provisioning URL.
pub const OTP_URL_PROPERTY: &str = "PassXYZ_OTP_Url";

/// Timestamps carried by every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Times {
    pub creation: DateTime<Utc>,
    pub last_modification: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub location_changed: DateTime<Utc>,
}

impl Times {
    /// All timestamps set to `now`.
    pub fn now(now: DateTime<Utc>) -> Self {
        Self {
            creation: now,
            last_modification: now,
            last_access: now,
            location_changed: now,
        }
    }

    /// Record an access, and a modification when `modified` is set.
    pub fn touch(&mut self, now: DateTime<Utc>, modified: bool) {
        self.last_access = now;
        if modified {
            self.last_modification = now;
        }
    }
}

/// A string field value with its protection flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub value: String,
    pub protected: bool,
}

impl FieldValue {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            protected: false,
        }
    }

    pub fn protected(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            protected: true,
        }
    }
}

/// A group (folder) in the database tree.
///
/// Child sequences and `parent` hold ids into the owning tree; the group
/// never owns its children directly.
#[derive(Debug, Clone)]
pub struct Group {
    pub id: NodeId,
    pub name: String,
    pub notes: String,
    pub icon_id: usize,
    pub custom_icon: Option<NodeId>,
    pub parent: Option<NodeId>,
    pub groups: Vec<NodeId>,
    pub entries: Vec<NodeId>,
    pub times: Times,
    /// Transient container (e.g. search results); never persisted.
    pub is_virtual: bool,
    pub expanded: bool,
    /// `None` inherits the parent's setting.
    pub enable_searching: Option<bool>,
}

/// Standard icon index for folders.
pub const FOLDER_ICON: usize = 48;

/// Standard icon index for entries.
pub const KEY_ICON: usize = 0;

impl Group {
    /// Create a detached group with a fresh id.
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::with_id(NodeId::new(), name, now)
    }

    pub fn with_id(id: NodeId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            notes: String::new(),
            icon_id: FOLDER_ICON,
            custom_icon: None,
            parent: None,
            groups: Vec::new(),
            entries: Vec::new(),
            times: Times::now(now),
            is_virtual: false,
            expanded: true,
            enable_searching: None,
        }
    }

    /// True when the group has no child groups and no entries.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.entries.is_empty()
    }
}

/// A password entry.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub fields: BTreeMap<String, FieldValue>,
    pub binaries: BTreeMap<String, Vec<u8>>,
    pub icon_id: usize,
    pub custom_icon: Option<NodeId>,
    pub custom_data: BTreeMap<String, String>,
    pub times: Times,
}

impl Entry {
    /// Create a detached entry with a fresh id and the given title.
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::with_id(NodeId::new(), title, now)
    }

    pub fn with_id(id: NodeId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(TITLE_FIELD.to_string(), FieldValue::plain(title));
        Self {
            id,
            parent: None,
            fields,
            binaries: BTreeMap::new(),
            icon_id: KEY_ICON,
            custom_icon: None,
            custom_data: BTreeMap::new(),
            times: Times::now(now),
        }
    }

    /// Get a field value, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|f| f.value.as_str())
    }

    /// The `Title` field, or empty.
    pub fn title(&self) -> &str {
        self.get(TITLE_FIELD).unwrap_or_default()
    }

    pub fn username(&self) -> &str {
        self.get(USERNAME_FIELD).unwrap_or_default()
    }

    pub fn password(&self) -> &str {
        self.get(PASSWORD_FIELD).unwrap_or_default()
    }

    pub fn url(&self) -> &str {
        self.get(URL_FIELD).unwrap_or_default()
    }

    pub fn notes(&self) -> &str {
        self.get(NOTES_FIELD).unwrap_or_default()
    }

    /// Set a field. `Password` is always stored protected.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = if name == PASSWORD_FIELD {
            FieldValue::protected(value)
        } else {
            FieldValue::plain(value)
        };
        self.fields.insert(name, value);
    }

    /// Custom data value for `key` when it is present and not blank.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.custom_data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// Record of a permanently deleted node, consumed by sync/merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedObject {
    pub id: NodeId,
    pub deletion_time: DateTime<Utc>,
}

/// Database-level settings persisted alongside the tree.
#[derive(Debug, Clone)]
pub struct Meta {
    pub name: String,
    pub recycle_bin_enabled: bool,
    /// `NodeId::ZERO` when no recycle bin has been created.
    pub recycle_bin_id: NodeId,
    pub recycle_bin_changed: DateTime<Utc>,
    /// Cursor id; `NodeId::ZERO` means the root group.
    pub last_selected_group: NodeId,
    pub master_key_changed: DateTime<Utc>,
}

impl Meta {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            recycle_bin_enabled: true,
            recycle_bin_id: NodeId::ZERO,
            recycle_bin_changed: now,
            last_selected_group: NodeId::ZERO,
            master_key_changed: now,
        }
    }
}
