//! Persistence backends.

use crate::document::Document;
use crate::error::Result;
use crate::key::CompositeKey;
use crate::status::{LogLevel, StatusLogger};
use anyhow::anyhow;
use std::sync::{Arc, Mutex};

/// Loads and stores a [`Document`] under a composite key.
///
/// A failed save must leave the previously stored copy intact.
pub trait Storage: Send {
    fn load(&mut self, key: &CompositeKey, logger: &mut dyn StatusLogger) -> Result<Document>;

    fn save(
        &mut self,
        document: &Document,
        key: &CompositeKey,
        logger: &mut dyn StatusLogger,
    ) -> Result<()>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Keeps the document in memory. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<(Document, CompositeKey)>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A storage already holding `document` under `key`.
    pub fn with_document(document: Document, key: CompositeKey) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some((document, key)))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().map(|s| s.is_none()).unwrap_or(true)
    }
}

impl Storage for MemoryStorage {
    fn load(&mut self, key: &CompositeKey, logger: &mut dyn StatusLogger) -> Result<Document> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        let Some((document, stored_key)) = slot.as_ref() else {
            logger.set_text("Nothing stored", LogLevel::Error);
            return Err(anyhow!("no database stored in memory").into());
        };
        if stored_key != key {
            logger.set_text("Invalid composite key", LogLevel::Error);
            return Err(anyhow!("invalid composite key").into());
        }
        Ok(document.clone())
    }

    fn save(
        &mut self,
        document: &Document,
        key: &CompositeKey,
        logger: &mut dyn StatusLogger,
    ) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        *slot = Some((document.clone(), key.clone()));
        logger.set_text("Stored database in memory", LogLevel::Info);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TracingStatusLogger;
    use chrono::Utc;

    #[test]
    fn load_checks_the_key() {
        let key = CompositeKey::from_password("pw");
        let mut storage = MemoryStorage::with_document(Document::new("db", Utc::now()), key.clone());
        let mut logger = TracingStatusLogger::new();

        assert!(storage.load(&key, &mut logger).is_ok());
        let wrong = CompositeKey::from_password("nope");
        assert!(storage.load(&wrong, &mut logger).is_err());
        assert!(MemoryStorage::new().load(&key, &mut logger).is_err());
    }
}
