//! Age key derivation from SSH public keys.
//!
//! Users publish SSH public keys in `keys.json`:
//!
//! ```json
//! { "keys": { "alice": { "public_keys": ["ssh-ed25519 AAAA... alice@laptop",
//!                                        { "publicKey": "ssh-ed25519 AAAA..." }] } } }
//! ```
//!
//! Each usable key is converted to an age recipient and named after its
//! owner: the first key `user_<name>`, the n-th `user_<name>_<n>`. Keys that
//! cannot be converted (hardware-backed `sk-` keys, structured entries
//! without a `publicKey`) are skipped with a warning.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use base64::Engine;
use serde::{Deserialize, Serialize};

use keyward_core::{AgeRecipient, KeyName, UserId};

use crate::error::{Result, SyncError};

/// Prefix of hardware security key types (`sk-ssh-ed25519@openssh.com`, ...).
const SECURITY_KEY_PREFIX: &str = "sk-";

const ED25519_KEY_TYPE: &str = "ssh-ed25519";

/// One entry of a user's `public_keys` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublicKeyEntry {
    /// An OpenSSH public key line.
    Raw(String),
    /// An object, carrying the key line under `publicKey` if at all.
    Structured {
        #[serde(rename = "publicKey", default, skip_serializing_if = "Option::is_none")]
        public_key: Option<String>,
    },
}

impl PublicKeyEntry {
    /// The key line to derive from, or why there is none.
    pub fn key_line(&self) -> std::result::Result<&str, String> {
        let line = match self {
            PublicKeyEntry::Raw(line) => line.as_str(),
            PublicKeyEntry::Structured {
                public_key: Some(line),
            } => line.as_str(),
            PublicKeyEntry::Structured { public_key: None } => {
                return Err("structured entry without publicKey".to_string())
            }
        };
        if line.trim_start().starts_with(SECURITY_KEY_PREFIX) {
            return Err("hardware security keys cannot be converted".to_string());
        }
        Ok(line)
    }
}

/// A user's published keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserKeys {
    #[serde(default)]
    pub public_keys: Vec<PublicKeyEntry>,
}

/// The public key document (`keys.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyDocument {
    #[serde(default)]
    pub keys: BTreeMap<UserId, UserKeys>,
}

impl PublicKeyDocument {
    /// Parse a JSON public key document.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SyncError::Parse(e.to_string()))
    }

    /// Read a JSON public key document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }
}

/// Outcome of deriving one public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Derivation {
    /// The age recipient of the key.
    Derived(AgeRecipient),
    /// The key type cannot be converted. Not an error: callers skip the key.
    Unsupported { reason: String },
}

/// Converts an SSH public key line to an age recipient.
pub trait KeyDeriver {
    /// Derive the age recipient of `public_key`.
    fn derive(&self, public_key: &str) -> Result<Derivation>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Runs an external converter (by default `ssh-to-age`): the key line on
/// stdin, the recipient on stdout.
#[derive(Debug, Clone)]
pub struct SshToAgeCommand {
    program: String,
    args: Vec<String>,
}

impl SshToAgeCommand {
    /// Default converter program.
    pub const DEFAULT_PROGRAM: &'static str = "ssh-to-age";

    /// Use `program` as converter.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Pass extra arguments to the converter.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for SshToAgeCommand {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PROGRAM)
    }
}

impl KeyDeriver for SshToAgeCommand {
    fn derive(&self, public_key: &str) -> Result<Derivation> {
        let spawn_error = |source: std::io::Error| SyncError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(public_key.as_bytes())
                .map_err(spawn_error)?;
        }
        let output = child.wait_with_output().map_err(spawn_error)?;

        if !output.status.success() {
            return Err(SyncError::ExternalTool {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let recipient = AgeRecipient::parse(stdout.trim())?;
        Ok(Derivation::Derived(recipient))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Converts `ssh-ed25519` keys in process, mapping the ed25519 point to its
/// X25519 equivalent the same way `ssh-to-age` does.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDeriver;

impl NativeDeriver {
    fn ed25519_bytes(blob: &[u8]) -> Result<[u8; 32]> {
        let mut rest = blob;
        let key_type = read_string(&mut rest)?;
        if key_type != ED25519_KEY_TYPE.as_bytes() {
            return Err(SyncError::MalformedPublicKey(
                "key type in blob does not match ssh-ed25519".to_string(),
            ));
        }
        let point = read_string(&mut rest)?;
        point.try_into().map_err(|_| {
            SyncError::MalformedPublicKey(format!("expected 32 key bytes, got {}", point.len()))
        })
    }
}

/// Read one length-prefixed string of the SSH wire format.
fn read_string<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    let truncated = || SyncError::MalformedPublicKey("truncated key blob".to_string());
    let data: &'a [u8] = *buf;
    if data.len() < 4 {
        return Err(truncated());
    }
    let (len, rest) = data.split_at(4);
    let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
    if rest.len() < len {
        return Err(truncated());
    }
    let (value, rest) = rest.split_at(len);
    *buf = rest;
    Ok(value)
}

impl KeyDeriver for NativeDeriver {
    fn derive(&self, public_key: &str) -> Result<Derivation> {
        let mut parts = public_key.split_whitespace();
        let (Some(key_type), Some(encoded)) = (parts.next(), parts.next()) else {
            return Err(SyncError::MalformedPublicKey(public_key.to_string()));
        };
        if key_type != ED25519_KEY_TYPE {
            return Ok(Derivation::Unsupported {
                reason: format!("{key_type} keys cannot be converted to age"),
            });
        }

        let blob = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| SyncError::MalformedPublicKey(e.to_string()))?;
        let bytes = Self::ed25519_bytes(&blob)?;
        Ok(Derivation::Derived(AgeRecipient::from_ed25519(&bytes)?))
    }

    fn name(&self) -> &str {
        "native"
    }
}

/// A derived user key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedKey {
    pub name: KeyName,
    /// The user whose public key this was derived from.
    pub user: UserId,
    pub recipient: AgeRecipient,
}

/// A public key that was not converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedKey {
    pub user: UserId,
    /// The key name it would have had.
    pub name: String,
    pub reason: String,
}

/// Result of [`derive_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DerivedKeys {
    pub keys: Vec<DerivedKey>,
    pub skipped: Vec<SkippedKey>,
}

/// Derive the age recipient of every published key, ordered by user and
/// key position.
///
/// Unconvertible keys, and users whose name cannot form a key name, are
/// skipped with a warning. Two users deriving the same key name
/// (`bob`'s second key and `bob_2`'s first) is an error. Any other failure
/// aborts.
pub fn derive_all(document: &PublicKeyDocument, deriver: &dyn KeyDeriver) -> Result<DerivedKeys> {
    let mut result = DerivedKeys::default();
    let mut owners: BTreeMap<KeyName, UserId> = BTreeMap::new();

    for (user, entry) in &document.keys {
        for (index, public_key) in entry.public_keys.iter().enumerate() {
            let name = match KeyName::user(user, index) {
                Ok(name) => name,
                Err(e) => {
                    let reason = e.to_string();
                    tracing::warn!(user = %user, %reason, "Unusable user name, skipping key");
                    result.skipped.push(SkippedKey {
                        user: user.clone(),
                        name: if index == 0 {
                            format!("user_{user}")
                        } else {
                            format!("user_{user}_{}", index + 1)
                        },
                        reason,
                    });
                    continue;
                }
            };

            let derivation = match public_key.key_line() {
                Ok(line) => deriver.derive(line).map_err(|e| match e {
                    SyncError::Core(source) => SyncError::InvalidDerivedKey {
                        key: name.clone(),
                        source,
                    },
                    other => other,
                })?,
                Err(reason) => Derivation::Unsupported { reason },
            };

            match derivation {
                Derivation::Derived(recipient) => {
                    if let Some(first) = owners.insert(name.clone(), user.clone()) {
                        return Err(SyncError::KeyNameCollision {
                            key: name,
                            first,
                            second: user.clone(),
                        });
                    }
                    tracing::debug!(key = %name, deriver = deriver.name(), "Derived age key");
                    result.keys.push(DerivedKey {
                        name,
                        user: user.clone(),
                        recipient,
                    });
                }
                Derivation::Unsupported { reason } => {
                    tracing::warn!(key = %name, %reason, "Unsupported public key, skipping");
                    result.skipped.push(SkippedKey {
                        user: user.clone(),
                        name: name.to_string(),
                        reason,
                    });
                }
            }
        }
    }

    tracing::info!(
        derived = result.keys.len(),
        skipped = result.skipped.len(),
        "Derived age keys"
    );
    Ok(result)
}
