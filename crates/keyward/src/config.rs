//! Configuration (`keyward.toml`).
//!
//! Every field has a default matching the usual org-config checkout layout,
//! so a missing file is the same as an empty one:
//!
//! ```toml
//! [paths]
//! privileges = "org-config/json/users.json"
//! public_keys = "org-config/json/keys.json"
//! key_access = "org-config/.sops.yaml"
//!
//! [access]
//! admin_role = "devops_common"
//! admin_privilege = "admin"
//!
//! [derive]
//! backend = "command"   # or "native"
//! program = "ssh-to-age"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use keyward_core::{Privilege, RoleId};
use keyward_policy::AdminAccess;
use keyward_sync::{KeyDeriver, NativeDeriver, SshToAgeCommand};

use crate::error::{KeywardError, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "keyward.toml";

/// Top-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub paths: PathSettings,
    pub access: AccessSettings,
    pub derive: DeriveSettings,
}

/// Locations of the input and output documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    /// Privilege declaration document (JSON, or YAML by extension).
    pub privileges: PathBuf,
    /// Published SSH public keys.
    pub public_keys: PathBuf,
    /// The key-access document maintained by keyward.
    pub key_access: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            privileges: PathBuf::from("org-config/json/users.json"),
            public_keys: PathBuf::from("org-config/json/keys.json"),
            key_access: PathBuf::from("org-config/.sops.yaml"),
        }
    }
}

/// Who counts as administrator with access to every secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessSettings {
    pub admin_role: RoleId,
    pub admin_privilege: Privilege,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            admin_role: RoleId::from(AdminAccess::DEFAULT_ROLE),
            admin_privilege: Privilege::from(AdminAccess::DEFAULT_PRIVILEGE),
        }
    }
}

/// Which key derivation backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeriveBackend {
    /// Run an external converter program.
    #[default]
    Command,
    /// Convert ed25519 keys in process.
    Native,
}

/// Key derivation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeriveSettings {
    pub backend: DeriveBackend,
    /// Converter program for the `command` backend.
    pub program: String,
}

impl Default for DeriveSettings {
    fn default() -> Self {
        Self {
            backend: DeriveBackend::Command,
            program: SshToAgeCommand::DEFAULT_PROGRAM.to_string(),
        }
    }
}

impl DeriveSettings {
    /// Build the configured deriver.
    pub fn deriver(&self) -> Box<dyn KeyDeriver> {
        match self.backend {
            DeriveBackend::Command => Box::new(SshToAgeCommand::new(self.program.clone())),
            DeriveBackend::Native => Box::new(NativeDeriver),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|e| KeywardError::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read settings from `path`, falling back to defaults if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let settings = Self::from_toml(&text, path)?;
                tracing::debug!(path = %path.display(), "Loaded settings");
                Ok(settings)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(KeywardError::ConfigIo {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}
