//! In-memory implementation of the DocumentStore trait.
//!
//! This is primarily for testing. It goes through the same YAML codec as the
//! file store but keeps the text in memory.

use std::sync::RwLock;

use crate::document::KeyAccessDocument;
use crate::error::{Result, StoreError};
use crate::traits::DocumentStore;

/// In-memory document store.
///
/// Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    text: RwLock<String>,
    saves: RwLock<usize>,
}

impl MemoryStore {
    /// Create a store holding an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given YAML text.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: RwLock::new(text.into()),
            saves: RwLock::new(0),
        }
    }

    /// The current YAML text.
    pub fn text(&self) -> Result<String> {
        self.text
            .read()
            .map(|text| text.clone())
            .map_err(|_| StoreError::Poisoned)
    }

    /// How many times the document was saved.
    pub fn saves(&self) -> Result<usize> {
        self.saves
            .read()
            .map(|saves| *saves)
            .map_err(|_| StoreError::Poisoned)
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self) -> Result<KeyAccessDocument> {
        let text = self.text.read().map_err(|_| StoreError::Poisoned)?;
        KeyAccessDocument::parse(&text)
    }

    fn save(&self, document: &KeyAccessDocument) -> Result<()> {
        let rendered = document.to_yaml();
        *self.text.write().map_err(|_| StoreError::Poisoned)? = rendered;
        *self.saves.write().map_err(|_| StoreError::Poisoned)? += 1;
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::DocumentStoreExt;
    use keyward_core::{AgeIdentity, KeyName, UserId};

    #[test]
    fn test_empty_store_loads_empty_document() {
        let store = MemoryStore::new();
        let doc = store.load().unwrap();
        assert!(doc.keys().is_empty());
        assert!(doc.rules().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryStore::new();
        let mut doc = store.load().unwrap();
        let recipient = AgeIdentity::from_bytes([9; 32]).recipient().unwrap();
        let name = KeyName::user(&UserId::from("alice"), 0).unwrap();
        doc.set_key(name.clone(), &recipient, false).unwrap();

        store.save(&doc).unwrap();
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.get_key(&name).unwrap().value(), recipient.as_str());
        assert_eq!(store.text().unwrap(), doc.to_yaml());
    }

    #[test]
    fn test_save_if_changed() {
        let store = MemoryStore::with_text("keys: []\ncreation_rules: []\n");
        let doc = store.load().unwrap();
        let loaded = doc.fingerprint();

        assert!(!store.save_if_changed(loaded, &doc).unwrap());
        assert_eq!(store.saves().unwrap(), 0);

        let mut doc = doc;
        let recipient = AgeIdentity::from_bytes([3; 32]).recipient().unwrap();
        doc.set_key(KeyName::user(&UserId::from("bob"), 0).unwrap(), &recipient, false)
            .unwrap();
        assert!(store.save_if_changed(loaded, &doc).unwrap());
        assert_eq!(store.saves().unwrap(), 1);
    }
}
