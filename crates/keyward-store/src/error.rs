//! Error types for the store module.

use std::path::PathBuf;

use keyward_core::KeyName;
use thiserror::Error;

/// Errors that can occur while reading, editing or persisting the key-access
/// document.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The text is not valid YAML, or uses YAML features the codec does not
    /// support.
    #[error("invalid YAML: {0}")]
    Yaml(String),

    /// The document is valid YAML but violates the key-access layout.
    #[error("document integrity error: {0}")]
    Integrity(String),

    /// A key name that is not in the key directory.
    #[error("unknown key: {0}")]
    UnknownKey(KeyName),

    /// A key with this name already exists.
    #[error("a key named {0} already exists")]
    DuplicateKey(KeyName),

    /// A rule for this path pattern already exists.
    #[error("a creation rule for {0} already exists")]
    DuplicateRule(String),

    /// No rule matches this path pattern.
    #[error("no creation rule matches {0}")]
    RuleNotFound(String),

    /// A key is still referenced by a rule.
    #[error("key {key} is still used by the creation rule for {rule}")]
    KeyInUse { key: KeyName, rule: String },

    /// I/O error on the document file.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An in-memory store lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// Core error (e.g. a malformed key name).
    #[error("core error: {0}")]
    Core(#[from] keyward_core::CoreError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
