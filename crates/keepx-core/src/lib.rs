//! Core tree model and database handling for keepx.
//!
//! Groups and entries live in an id-keyed arena ([`Tree`]); the
//! [`Database`] handle adds the recycle bin, path navigation from a current
//! group, search, and persistence through a [`Storage`] backend.

pub mod clock;
pub mod database;
pub mod document;
pub mod error;
pub mod icons;
pub mod id;
pub mod kdbx;
pub mod key;
pub mod models;
pub mod path;
pub mod recycle;
pub mod search;
pub mod status;
pub mod storage;
pub mod tree;

pub use clock::{Clock, FixedClock, SystemClock};
pub use database::Database;
pub use document::Document;
pub use error::{Error, Result};
pub use icons::{CustomIcon, CustomIconStore, MemoryIconStore};
pub use id::NodeId;
pub use kdbx::KdbxFile;
pub use key::CompositeKey;
pub use models::{DeletedObject, Entry, FieldValue, Group, Meta, Times};
pub use recycle::Disposition;
pub use search::SearchHit;
pub use status::{LogLevel, StatusLogger, TracingStatusLogger};
pub use storage::{MemoryStorage, Storage};
pub use tree::Tree;
