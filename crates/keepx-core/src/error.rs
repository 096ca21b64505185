//! Error types for keepx-core.

use crate::id::NodeId;
use thiserror::Error;

/// Result type alias using keepx-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by tree and database operations.
///
/// Lookups that find nothing return `None` and refused moves return
/// `Ok(false)`; neither is an error.
#[derive(Debug, Error)]
pub enum Error {
    /// A required node was absent, unknown, or not allowed for the call.
    #[error("precondition violated: {reason}")]
    Precondition { reason: String },

    /// A node with this id already exists in the tree or child list.
    #[error("duplicate node id: {id}")]
    DuplicateId { id: NodeId },

    /// The database is not open.
    #[error("database is not open")]
    Closed,

    /// The database has no storage backend to save to.
    #[error("database is not bound to a storage backend")]
    NoStorage,

    /// Failure reported by the storage collaborator, passed through as-is.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl Error {
    /// Create a Precondition error.
    pub fn precondition(reason: impl Into<String>) -> Self {
        Error::Precondition {
            reason: reason.into(),
        }
    }

    /// Create a DuplicateId error.
    pub fn duplicate_id(id: NodeId) -> Self {
        Error::DuplicateId { id }
    }

    /// True for errors caused by a bad call rather than by a collaborator.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::Precondition { .. })
    }
}
