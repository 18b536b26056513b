//! Error types for keyward core.

use thiserror::Error;

/// Core errors raised while parsing identifiers and key material.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid key name `{name}`: {reason}")]
    InvalidKeyName { name: String, reason: &'static str },

    #[error("empty {0} identifier")]
    EmptyIdentifier(&'static str),

    #[error("invalid age recipient `{value}`: {reason}")]
    InvalidRecipient { value: String, reason: String },

    #[error("invalid ed25519 public key")]
    InvalidPublicKey,

    #[error("encoding error: {0}")]
    EncodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
