//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use ed25519_dalek::SigningKey;
use tempfile::TempDir;

use keyward_core::{AgeIdentity, AgeRecipient, HostId, KeyName};
use keyward_store::{FileStore, KeyAccessDocument};
use keyward_sync::{Derivation, KeyDeriver, Result as SyncResult};

/// Privilege declarations used across the integration tests.
///
/// - `alice` is a global administrator
/// - `bob` holds `admin` in `devops_common` directly
/// - `carol` holds `admin` in `oncall`, which `devops_common` enables
/// - `dave` only reads on `h2`
pub const SAMPLE_PRIVILEGES: &str = r#"{
  "global_admins": ["alice"],
  "users": {
    "per-host": {
      "h1": { "enable_roles": ["devops_common"] },
      "h2": { "enable": { "dave": "read" }, "enable_roles": ["devops_common"] }
    },
    "roles": {
      "devops_common": { "enable": { "bob": "admin" }, "enable_roles": ["oncall"] },
      "oncall": { "enable": { "carol": "admin" } }
    }
  }
}"#;

/// A key-access document with one rule per host and no user keys yet.
///
/// The `h2` rule carries an extra `encrypted_regex` field and the document an
/// extra top-level `stores` section.
pub fn sample_key_access() -> String {
    format!(
        r"keys:
  - &host_h1 {h1}
  - &host_h2 {h2}
creation_rules:
  - path_regex: ^secrets/hosts/h1\.yaml$
    key_groups:
      - age:
          - *host_h1
  - path_regex: ^secrets/hosts/h2\.yaml$
    encrypted_regex: ^(data|stringData)$
    key_groups:
      - age:
          - *host_h2
stores:
  yaml:
    indent: 2
",
        h1 = host_recipient("h1"),
        h2 = host_recipient("h2"),
    )
}

/// Published public keys for the sample users.
///
/// `carol`'s first key is hardware backed and cannot be converted, so her
/// usable key is `user_carol_2`.
pub fn sample_public_keys() -> String {
    serde_json::json!({
        "keys": {
            "alice": { "public_keys": [ssh_ed25519_line(1, "alice@laptop")] },
            "bob": { "public_keys": [
                ssh_ed25519_line(2, "bob@laptop"),
                { "publicKey": ssh_ed25519_line(3, "bob@desktop"), "comment": "desktop" }
            ]},
            "carol": { "public_keys": [
                "sk-ssh-ed25519@openssh.com AAAAGnNrLXNzaC1lZDI1NTE5QG9wZW5zc2guY29t carol@yubikey",
                ssh_ed25519_line(4, "carol@laptop")
            ]},
            "dave": { "public_keys": [ssh_ed25519_line(5, "dave@laptop")] }
        }
    })
    .to_string()
}

/// Deterministic age recipient for `seed`.
pub fn recipient(seed: u8) -> AgeRecipient {
    match AgeIdentity::from_bytes([seed; 32]).recipient() {
        Ok(recipient) => recipient,
        Err(e) => panic!("fixture recipient {seed}: {e}"),
    }
}

/// Deterministic recipient for a host, distinct from every user fixture.
pub fn host_recipient(host: &str) -> AgeRecipient {
    let seed = host.bytes().fold(100u8, |acc, b| acc.wrapping_add(b));
    recipient(seed)
}

fn ed25519_point(seed: u8) -> [u8; 32] {
    SigningKey::from_bytes(&[seed; 32]).verifying_key().to_bytes()
}

/// A well-formed `ssh-ed25519` public key line for `seed`.
pub fn ssh_ed25519_line(seed: u8, comment: &str) -> String {
    const KEY_TYPE: &str = "ssh-ed25519";
    let point = ed25519_point(seed);

    let mut blob = Vec::with_capacity(4 + KEY_TYPE.len() + 4 + point.len());
    blob.extend_from_slice(&(KEY_TYPE.len() as u32).to_be_bytes());
    blob.extend_from_slice(KEY_TYPE.as_bytes());
    blob.extend_from_slice(&(point.len() as u32).to_be_bytes());
    blob.extend_from_slice(&point);

    let encoded = base64::engine::general_purpose::STANDARD.encode(blob);
    format!("{KEY_TYPE} {encoded} {comment}")
}

/// The age recipient [`ssh_ed25519_line`]`(seed, _)` converts to.
pub fn ssh_ed25519_recipient(seed: u8) -> AgeRecipient {
    match AgeRecipient::from_ed25519(&ed25519_point(seed)) {
        Ok(recipient) => recipient,
        Err(e) => panic!("fixture ssh recipient {seed}: {e}"),
    }
}

/// A deriver with a fixed answer per public key line.
///
/// Lines without an answer are reported as unsupported.
#[derive(Debug, Clone, Default)]
pub struct StaticDeriver {
    answers: BTreeMap<String, AgeRecipient>,
}

impl StaticDeriver {
    /// Create a deriver that knows no keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `recipient` for `public_key`.
    pub fn with(mut self, public_key: impl Into<String>, recipient: AgeRecipient) -> Self {
        self.answers.insert(public_key.into(), recipient);
        self
    }
}

impl KeyDeriver for StaticDeriver {
    fn derive(&self, public_key: &str) -> SyncResult<Derivation> {
        Ok(match self.answers.get(public_key) {
            Some(recipient) => Derivation::Derived(recipient.clone()),
            None => Derivation::Unsupported {
                reason: "no fixture answer".to_string(),
            },
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// An on-disk workspace in a temporary directory.
///
/// Files are laid out the way the default configuration expects them,
/// relative to [`TestFixture::root`].
pub struct TestFixture {
    dir: TempDir,
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    /// Create an empty workspace.
    pub fn new() -> Self {
        match TempDir::new() {
            Ok(dir) => Self { dir },
            Err(e) => panic!("failed to create fixture directory: {e}"),
        }
    }

    /// Create a workspace holding the sample documents.
    pub fn sample() -> Self {
        let fixture = Self::new();
        fixture.write_privileges(SAMPLE_PRIVILEGES);
        fixture.write_public_keys(&sample_public_keys());
        fixture.write_key_access(&sample_key_access());
        fixture
    }

    /// The workspace directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the privilege declaration document.
    pub fn privileges_path(&self) -> PathBuf {
        self.root().join("users.json")
    }

    /// Path of the public key document.
    pub fn public_keys_path(&self) -> PathBuf {
        self.root().join("keys.json")
    }

    /// Path of the key-access document.
    pub fn key_access_path(&self) -> PathBuf {
        self.root().join(".sops.yaml")
    }

    /// A file store over the key-access document.
    pub fn store(&self) -> FileStore {
        FileStore::new(self.key_access_path())
    }

    pub fn write_privileges(&self, text: &str) {
        self.write(&self.privileges_path(), text);
    }

    pub fn write_public_keys(&self, text: &str) {
        self.write(&self.public_keys_path(), text);
    }

    pub fn write_key_access(&self, text: &str) {
        self.write(&self.key_access_path(), text);
    }

    /// Current text of the key-access document.
    pub fn key_access_text(&self) -> String {
        let path = self.key_access_path();
        match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => panic!("failed to read {}: {e}", path.display()),
        }
    }

    /// Current key-access document.
    pub fn key_access(&self) -> KeyAccessDocument {
        match KeyAccessDocument::parse(&self.key_access_text()) {
            Ok(document) => document,
            Err(e) => panic!("fixture document does not load: {e}"),
        }
    }

    /// Key names of the first rule for `host`'s secrets file.
    pub fn host_rule_keys(&self, host: &str) -> Vec<String> {
        let pattern = format!(r"^secrets/hosts/{host}\.yaml$");
        let document = self.key_access();
        match document.get_rule(&pattern) {
            Some(rule) => rule.keys().iter().map(KeyName::to_string).collect(),
            None => panic!("no rule for {}", HostId::from(host)),
        }
    }

    fn write(&self, path: &Path, text: &str) {
        if let Err(e) = std::fs::write(path, text) {
            panic!("failed to write {}: {e}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_sync::NativeDeriver;

    #[test]
    fn test_sample_documents_load() {
        let fixture = TestFixture::sample();
        let document = fixture.key_access();
        assert_eq!(document.keys().len(), 2);
        assert_eq!(document.rules().len(), 2);
        assert_eq!(fixture.host_rule_keys("h1"), vec!["host_h1"]);

        keyward_policy::PrivilegeModel::load(fixture.privileges_path()).unwrap();
        keyward_sync::PublicKeyDocument::load(fixture.public_keys_path()).unwrap();
    }

    #[test]
    fn test_ssh_line_converts_natively() {
        let line = ssh_ed25519_line(9, "x@y");
        assert_eq!(
            NativeDeriver.derive(&line).unwrap(),
            Derivation::Derived(ssh_ed25519_recipient(9))
        );
    }

    #[test]
    fn test_static_deriver() {
        let deriver = StaticDeriver::new().with("ssh-rsa AAAA", recipient(1));
        assert_eq!(
            deriver.derive("ssh-rsa AAAA").unwrap(),
            Derivation::Derived(recipient(1))
        );
        assert!(matches!(
            deriver.derive("ssh-rsa BBBB").unwrap(),
            Derivation::Unsupported { .. }
        ));
    }

    #[test]
    fn test_host_recipients_are_distinct() {
        assert_ne!(host_recipient("h1"), host_recipient("h2"));
        assert_ne!(host_recipient("h1"), recipient(1));
    }
}
