//! Document store trait: where the key-access document lives.
//!
//! The reconciler loads the document once, edits it in memory and saves it
//! once, so a store only needs whole-document load and save. Implementations
//! include a file on disk (primary) and an in-memory buffer (for tests).

use keyward_core::Fingerprint;

use crate::document::KeyAccessDocument;
use crate::error::Result;

/// Whole-document persistence for the key-access document.
pub trait DocumentStore: Send + Sync {
    /// Load and validate the current document.
    fn load(&self) -> Result<KeyAccessDocument>;

    /// Replace the stored document.
    ///
    /// Implementations must never leave a partially written document behind.
    fn save(&self, document: &KeyAccessDocument) -> Result<()>;

    /// Human readable location, for logs and reports.
    fn location(&self) -> String;
}

/// Extension trait for common store patterns.
pub trait DocumentStoreExt: DocumentStore {
    /// Save only if the document differs from `loaded`.
    ///
    /// Returns whether anything was written.
    fn save_if_changed(&self, loaded: Fingerprint, document: &KeyAccessDocument) -> Result<bool>;
}

impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {
    fn save_if_changed(&self, loaded: Fingerprint, document: &KeyAccessDocument) -> Result<bool> {
        if document.fingerprint() == loaded {
            tracing::debug!(location = %self.location(), "Document unchanged, not saving");
            return Ok(false);
        }
        self.save(document)?;
        Ok(true)
    }
}
