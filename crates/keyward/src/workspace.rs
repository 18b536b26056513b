//! The Keyward facade: one place that knows where every input lives.
//!
//! Brings together the privilege model, the published public keys, the key
//! derivation backend and the key-access document store.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use keyward_core::{AgeIdentity, AgeRecipient, HostId, KeyName, KeyOwner};
use keyward_policy::{resolve, AdminAccess, AuditReport, EffectiveGrants, PrivilegeModel};
use keyward_store::{
    AccessRule, DocumentStore, DocumentStoreExt, FileStore, KeyAccessDocument, KeyEntry,
    KeyOutcome, RuleOutcome, StoreError,
};
use keyward_sync::{derive_all, reconcile, KeyDeriver, PublicKeyDocument, ReconcileReport, SkippedKey};

use crate::config::Settings;
use crate::error::{KeywardError, Result};

/// What a user sync did.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// Where the key-access document lives.
    pub location: String,
    #[serde(flatten)]
    pub reconcile: ReconcileReport,
    /// Published keys that could not be converted.
    pub skipped: Vec<SkippedKey>,
    pub dry_run: bool,
    /// Whether the document was written.
    pub written: bool,
}

/// Where an enrolled host's key comes from.
#[derive(Debug, Clone)]
pub enum HostKeySource {
    /// An existing recipient.
    Recipient(AgeRecipient),
    /// Generate a new identity and write it to this file.
    Generate(PathBuf),
}

/// What a host enrollment did.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollReport {
    pub key: KeyName,
    pub path_regex: String,
    pub recipient: AgeRecipient,
    /// File holding the generated identity, if one was generated.
    pub identity_file: Option<PathBuf>,
}

/// The main Keyward struct.
///
/// Provides a unified API for:
/// - Resolving and auditing the privilege model
/// - Syncing user keys into the key-access document
/// - Maintaining keys and rules by hand
/// - Enrolling hosts
pub struct Keyward<S: DocumentStore> {
    /// Paths and access settings.
    settings: Settings,
    /// Where the key-access document lives.
    store: Arc<S>,
    /// SSH to age key conversion.
    deriver: Box<dyn KeyDeriver>,
}

impl Keyward<FileStore> {
    /// Open the file-backed workspace described by `settings`.
    pub fn open(settings: Settings) -> Self {
        let store = FileStore::new(settings.paths.key_access.clone());
        let deriver = settings.derive.deriver();
        Self::new(settings, store, deriver)
    }
}

impl<S: DocumentStore> Keyward<S> {
    /// Create a workspace over any document store.
    pub fn new(settings: Settings, store: S, deriver: Box<dyn KeyDeriver>) -> Self {
        Self {
            settings,
            store: Arc::new(store),
            deriver,
        }
    }

    /// The settings in use.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The document store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Load the current key-access document.
    pub fn document(&self) -> Result<KeyAccessDocument> {
        Ok(self.store.load()?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Privilege Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Load the privilege model.
    pub fn load_model(&self) -> Result<PrivilegeModel> {
        Ok(PrivilegeModel::load(&self.settings.paths.privileges)?)
    }

    /// Resolve the privilege model into effective grants.
    pub fn resolve(&self) -> Result<EffectiveGrants> {
        let model = self.load_model()?;
        Ok(resolve(&model)?)
    }

    /// Build the audit tables.
    pub fn audit(&self) -> Result<AuditReport> {
        let model = self.load_model()?;
        let grants = resolve(&model)?;
        Ok(AuditReport::build(&model, &grants))
    }

    /// The administrator access policy for `model`.
    pub fn access_policy(&self, model: &PrivilegeModel, grants: &EffectiveGrants) -> AdminAccess {
        AdminAccess::new(
            model,
            grants,
            &self.settings.access.admin_role,
            &self.settings.access.admin_privilege,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Derive every user key and bring the key-access document in line with
    /// the resolved privileges.
    ///
    /// The privilege model is resolved before anything else, so a conflict
    /// aborts the run with the document untouched.
    pub fn sync_users(&self, dry_run: bool) -> Result<SyncReport> {
        let model = self.load_model()?;
        let grants = resolve(&model)?;
        let policy = self.access_policy(&model, &grants);

        let public_keys = PublicKeyDocument::load(&self.settings.paths.public_keys)?;
        let derived = derive_all(&public_keys, self.deriver.as_ref())?;

        let mut document = self.store.load()?;
        let report = reconcile(&mut document, &derived.keys, &policy)?;

        let written = if dry_run {
            false
        } else {
            self.store.save_if_changed(report.before, &document)?
        };

        tracing::info!(
            location = %self.store.location(),
            changed = report.changed(),
            written,
            dry_run,
            skipped = derived.skipped.len(),
            "User sync finished"
        );

        Ok(SyncReport {
            location: self.store.location(),
            reconcile: report,
            skipped: derived.skipped,
            dry_run,
            written,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Keys in document order, optionally only those of one owner kind.
    pub fn list_keys(&self, owner: Option<KeyOwner>) -> Result<Vec<KeyEntry>> {
        let document = self.store.load()?;
        Ok(document
            .list_keys(|name| owner.map_or(true, |o| name.owner() == o))
            .into_iter()
            .cloned()
            .collect())
    }

    /// Add a key, or with `replace` overwrite an existing one.
    pub fn set_key(&self, name: KeyName, recipient: &AgeRecipient, replace: bool) -> Result<KeyOutcome> {
        self.edit(|document| document.set_key(name, recipient, replace))
    }

    /// Remove a key no rule references.
    pub fn delete_key(&self, name: &KeyName) -> Result<KeyEntry> {
        self.edit(|document| document.delete_key(name))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rule Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Rules in document order.
    pub fn list_rules(&self) -> Result<Vec<AccessRule>> {
        let document = self.store.load()?;
        Ok(document.rules().iter().cloned().collect())
    }

    /// Create a rule, or with `replace` overwrite the existing one.
    pub fn set_rule(&self, path_regex: &str, keys: &[KeyName], replace: bool) -> Result<RuleOutcome> {
        self.edit(|document| document.set_rule(path_regex, keys, replace))
    }

    /// Remove the first rule for `path_regex`.
    pub fn delete_rule(&self, path_regex: &str) -> Result<AccessRule> {
        self.edit(|document| document.delete_rule(path_regex))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Host Enrollment
    // ─────────────────────────────────────────────────────────────────────────

    /// Enroll a host: add its key and a rule for its own secrets file.
    ///
    /// Fails without writing anything if the host key or its rule already
    /// exists. With [`HostKeySource::Generate`] the identity file is created
    /// first and must not exist yet.
    pub fn enroll_host(&self, host: &HostId, source: HostKeySource) -> Result<EnrollReport> {
        let key = KeyName::host(host)?;
        let path_regex = host_rule_pattern(host);

        let mut document = self.store.load()?;
        if document.get_key(&key).is_some() {
            return Err(StoreError::DuplicateKey(key).into());
        }
        if document.get_rule(&path_regex).is_some() {
            return Err(StoreError::DuplicateRule(path_regex).into());
        }

        let (recipient, identity_file) = match source {
            HostKeySource::Recipient(recipient) => (recipient, None),
            HostKeySource::Generate(path) => {
                let recipient = write_identity(&path)?;
                (recipient, Some(path))
            }
        };

        document.set_key(key.clone(), &recipient, false)?;
        document.set_rule(&path_regex, std::slice::from_ref(&key), false)?;
        self.store.save(&document)?;

        tracing::info!(host = %host, key = %key, rule = %path_regex, "Enrolled host");
        Ok(EnrollReport {
            key,
            path_regex,
            recipient,
            identity_file,
        })
    }

    /// Load, apply `f`, and save if `f` succeeds.
    fn edit<T>(
        &self,
        f: impl FnOnce(&mut KeyAccessDocument) -> keyward_store::Result<T>,
    ) -> Result<T> {
        let mut document = self.store.load()?;
        let loaded = document.fingerprint();
        let value = f(&mut document)?;
        self.store.save_if_changed(loaded, &document)?;
        Ok(value)
    }
}

/// The rule pattern covering a host's own secrets file.
pub fn host_rule_pattern(host: &HostId) -> String {
    format!(r"^secrets/hosts/{}\.yaml$", escape_regex(host.as_str()))
}

fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if r"\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Generate an age identity, write it to a new file readable only by its
/// owner, and return its recipient.
fn write_identity(path: &Path) -> Result<AgeRecipient> {
    let identity = AgeIdentity::generate();
    let recipient = identity.recipient()?;
    let secret = identity.to_bech32()?;

    let io_error = |source: std::io::Error| KeywardError::IdentityFile {
        path: path.to_path_buf(),
        source,
    };

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(io_error)?;
    write!(file, "# public key: {recipient}\n{secret}\n").map_err(io_error)?;
    file.sync_all().map_err(io_error)?;

    tracing::debug!(path = %path.display(), "Wrote host identity");
    Ok(recipient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_rule_pattern_escapes_host() {
        assert_eq!(
            host_rule_pattern(&HostId::from("web-1")),
            r"^secrets/hosts/web-1\.yaml$"
        );
        assert_eq!(
            host_rule_pattern(&HostId::from("db.prod")),
            r"^secrets/hosts/db\.prod\.yaml$"
        );
    }

    #[test]
    fn test_write_identity_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h1.agekey");

        let recipient = write_identity(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), format!("# public key: {recipient}"));
        assert!(lines.next().unwrap().starts_with("AGE-SECRET-KEY-1"));

        assert!(matches!(
            write_identity(&path),
            Err(KeywardError::IdentityFile { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_identity_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h1.agekey");
        write_identity(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
