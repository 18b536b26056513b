//! Error types for the sync module.

use std::path::PathBuf;

use keyward_core::{KeyName, UserId};
use thiserror::Error;

/// Errors that can occur while deriving keys or reconciling the key-access
/// document.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The key-derivation program exited unsuccessfully.
    #[error("{program} failed ({status}): {stderr}")]
    ExternalTool {
        program: String,
        status: String,
        stderr: String,
    },

    /// The key-derivation program could not be run.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The derivation produced something that is not an age recipient.
    #[error("derived key for {key} is not an age recipient: {source}")]
    InvalidDerivedKey {
        key: KeyName,
        #[source]
        source: keyward_core::CoreError,
    },

    /// Two users derive keys with the same name.
    #[error("key name {key} is derived for both {first} and {second}")]
    KeyNameCollision {
        key: KeyName,
        first: UserId,
        second: UserId,
    },

    /// A public key line could not be decoded.
    #[error("malformed public key: {0}")]
    MalformedPublicKey(String),

    /// The public key document could not be read.
    #[error("failed to read public keys {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The public key document is malformed.
    #[error("failed to parse public keys: {0}")]
    Parse(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] keyward_store::StoreError),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] keyward_core::CoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
