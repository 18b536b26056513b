//! Error types for keyward.

use std::path::PathBuf;

use keyward_core::CoreError;
use keyward_policy::PolicyError;
use keyward_store::StoreError;
use keyward_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during keyward operations.
#[derive(Debug, Error)]
pub enum KeywardError {
    /// Configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is malformed.
    #[error("invalid config {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Privilege model error, including conflicts.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Key-access document error.
    #[error("document error: {0}")]
    Store(#[from] StoreError),

    /// Key derivation or reconciliation error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Identifier or key material error.
    #[error("{0}")]
    Core(#[from] CoreError),

    /// A host identity file could not be written.
    #[error("failed to write identity file {path}: {source}")]
    IdentityFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for keyward operations.
pub type Result<T> = std::result::Result<T, KeywardError>;
