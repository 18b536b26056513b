//! Cryptographic primitives for keyward.
//!
//! Wraps age X25519 recipients/identities and Blake3 document fingerprints
//! with strong types.

use bech32::{Bech32, Hrp};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::error::{CoreError, Result};

/// Human readable part of an age recipient.
const RECIPIENT_HRP: &str = "age";

/// Human readable part of an age secret key.
const IDENTITY_HRP: &str = "age-secret-key-";

/// A 32-byte Blake3 digest of a serialized document.
///
/// Used to tell whether a reconciliation changed anything.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of the given bytes.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"keyward-document-v0:");
        hasher.update(data);
        Self(*hasher.finalize().as_bytes())
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// A validated age X25519 recipient, e.g. `age1ql3z7hjy54pw3hyww5ayyfg7zqgvc7w3j2elw8zmrj2kg5sfn9aqmcac8p`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgeRecipient(String);

impl AgeRecipient {
    /// Parse and validate a bech32 encoded recipient.
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason: String| CoreError::InvalidRecipient {
            value: value.to_string(),
            reason,
        };

        let (hrp, data) = bech32::decode(value).map_err(|e| invalid(e.to_string()))?;
        if hrp.to_lowercase() != RECIPIENT_HRP {
            return Err(invalid(format!("unexpected prefix `{}`", hrp.to_lowercase())));
        }
        let bytes: [u8; 32] = data
            .as_slice()
            .try_into()
            .map_err(|_| invalid(format!("expected 32 bytes, got {}", data.len())))?;

        Self::from_x25519(&PublicKey::from(bytes))
    }

    /// Encode an X25519 public key as a recipient.
    pub fn from_x25519(key: &PublicKey) -> Result<Self> {
        let hrp = Hrp::parse(RECIPIENT_HRP).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        let encoded = bech32::encode::<Bech32>(hrp, key.as_bytes())
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(Self(encoded))
    }

    /// Convert an ed25519 public key (e.g. from an `ssh-ed25519` key) to the
    /// recipient of its birationally equivalent X25519 key.
    pub fn from_ed25519(bytes: &[u8; 32]) -> Result<Self> {
        let verifying_key = VerifyingKey::from_bytes(bytes).map_err(|_| CoreError::InvalidPublicKey)?;
        let montgomery = verifying_key.to_montgomery();
        Self::from_x25519(&PublicKey::from(montgomery.to_bytes()))
    }

    /// Borrow the encoded recipient.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AgeRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AgeRecipient({})", self.0)
    }
}

impl fmt::Display for AgeRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AgeRecipient {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<AgeRecipient> for String {
    fn from(recipient: AgeRecipient) -> Self {
        recipient.0
    }
}

/// An age X25519 secret key.
///
/// Generated for hosts at enrollment; only its recipient ever enters the
/// key-access document.
pub struct AgeIdentity(StaticSecret);

impl AgeIdentity {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(rand::rngs::OsRng))
    }

    /// Create from secret bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// The recipient matching this identity.
    pub fn recipient(&self) -> Result<AgeRecipient> {
        AgeRecipient::from_x25519(&PublicKey::from(&self.0))
    }

    /// Encode as `AGE-SECRET-KEY-1...`, the format age identity files use.
    pub fn to_bech32(&self) -> Result<String> {
        let hrp = Hrp::parse(IDENTITY_HRP).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        bech32::encode_upper::<Bech32>(hrp, &self.0.to_bytes())
            .map_err(|e| CoreError::EncodingError(e.to_string()))
    }
}

impl fmt::Debug for AgeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.recipient() {
            Ok(recipient) => write!(f, "AgeIdentity({recipient})"),
            Err(_) => f.write_str("AgeIdentity(<invalid>)"),
        }
    }
}
