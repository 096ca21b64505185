//! Custom icon storage.
//!
//! Icons are opaque image blobs keyed by id; decoding and scaling them is
//! left to the caller.

use crate::id::NodeId;
use std::collections::BTreeMap;

/// A named custom icon blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomIcon {
    pub id: NodeId,
    pub name: String,
    pub data: Vec<u8>,
}

/// Lookup and registration of custom icons.
pub trait CustomIconStore {
    fn custom_icon(&self, id: NodeId) -> Option<&CustomIcon>;

    /// First icon registered under `name`. Icons read from a file carry no
    /// name and are only found by id.
    fn custom_icon_by_name(&self, name: &str) -> Option<&CustomIcon>;

    /// Register an icon and return its new id, or `None` for an empty blob.
    fn save_custom_icon(&mut self, data: Vec<u8>, name: &str) -> Option<NodeId>;
}

/// In-memory icon store.
#[derive(Debug, Clone, Default)]
pub struct MemoryIconStore {
    icons: BTreeMap<NodeId, CustomIcon>,
}

impl MemoryIconStore {
    /// Number of stored icons.
    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }

    /// Icons in id order.
    pub fn iter(&self) -> impl Iterator<Item = &CustomIcon> {
        self.icons.values()
    }

    /// Insert an icon with a known id, replacing any previous one.
    pub fn insert(&mut self, icon: CustomIcon) {
        self.icons.insert(icon.id, icon);
    }
}

impl CustomIconStore for MemoryIconStore {
    fn custom_icon(&self, id: NodeId) -> Option<&CustomIcon> {
        if id.is_zero() {
            return None;
        }
        self.icons.get(&id)
    }

    fn custom_icon_by_name(&self, name: &str) -> Option<&CustomIcon> {
        if name.is_empty() {
            return None;
        }
        self.icons.values().find(|icon| icon.name == name)
    }

    fn save_custom_icon(&mut self, data: Vec<u8>, name: &str) -> Option<NodeId> {
        if data.is_empty() {
            return None;
        }
        let id = NodeId::new();
        self.icons.insert(
            id,
            CustomIcon {
                id,
                name: name.to_string(),
                data,
            },
        );
        Some(id)
    }
}
