//! Node identifiers.

use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier of a group or entry within a database.
///
/// Backed by a UUID so ids carry over unchanged to and from KDBX files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Uuid);

impl NodeId {
    /// The unset sentinel (nil UUID).
    pub const ZERO: NodeId = NodeId(Uuid::nil());

    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The backing UUID, as stored in KDBX files.
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }

    /// True for the unset sentinel.
    pub fn is_zero(&self) -> bool {
        self.0.is_nil()
    }
}

/// Defaults to the unset sentinel, never to a fresh id.
impl Default for NodeId {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<Uuid> for NodeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<NodeId> for Uuid {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_unique_and_not_zero() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
        assert!(!a.is_zero());
        assert!(NodeId::ZERO.is_zero());
    }

    #[test]
    fn default_is_the_unset_sentinel() {
        assert_eq!(NodeId::default(), NodeId::ZERO);
        let ids: Vec<Uuid> = [Some(NodeId::new()), None]
            .into_iter()
            .flatten()
            .map(NodeId::as_uuid)
            .collect();
        assert_eq!(ids.len(), 1);
        assert!(!ids[0].is_nil());
    }

    #[test]
    fn parses_its_display_form() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<NodeId>().is_err());
    }
}
