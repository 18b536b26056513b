//! The privilege model: declared hosts, roles, users and the four grant
//! relations between them.
//!
//! The model is loaded from a declaration document shaped like
//!
//! ```json
//! {
//!   "global_admins": ["alice"],
//!   "users": {
//!     "per-host": { "h1": { "enable": { "bob": "read" }, "enable_roles": ["ops"] } },
//!     "roles":    { "ops": { "enable": { "carol": "admin" }, "enable_roles": [] } }
//!   }
//! }
//! ```
//!
//! and never mutated after loading.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use keyward_core::{HostId, Privilege, RoleId, UserId};

use crate::error::{PolicyError, Result};

/// What a host or a role declares: direct user grants plus enabled roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    /// Users granted a privilege directly.
    #[serde(default)]
    pub enable: BTreeMap<UserId, Privilege>,

    /// Roles whose grants are enabled.
    #[serde(default)]
    pub enable_roles: BTreeSet<RoleId>,
}

impl Declaration {
    fn is_empty(&self) -> bool {
        self.enable.is_empty() && self.enable_roles.is_empty()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PrivilegeDocument {
    #[serde(default)]
    global_admins: BTreeSet<UserId>,
    #[serde(default)]
    users: UsersSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersSection {
    #[serde(rename = "per-host", default)]
    per_host: BTreeMap<HostId, Declaration>,
    #[serde(default)]
    roles: BTreeMap<RoleId, Declaration>,
}

/// In-memory privilege model.
///
/// - HostDirectGrant: `hosts[h].enable`
/// - HostRoleEnable: `hosts[h].enable_roles`
/// - RoleDirectGrant: `roles[r].enable`
/// - RoleRoleEnable: `roles[r].enable_roles`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegeModel {
    global_admins: BTreeSet<UserId>,
    hosts: BTreeMap<HostId, Declaration>,
    roles: BTreeMap<RoleId, Declaration>,
}

impl PrivilegeModel {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON declaration document.
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: PrivilegeDocument =
            serde_json::from_str(text).map_err(|e| PolicyError::Parse(e.to_string()))?;
        Ok(Self::from_document(doc))
    }

    /// Parse a YAML declaration document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let doc: PrivilegeDocument =
            serde_yaml::from_str(text).map_err(|e| PolicyError::Parse(e.to_string()))?;
        Ok(Self::from_document(doc))
    }

    /// Load a declaration document, choosing the format by file extension
    /// (`.yaml`/`.yml` or JSON otherwise).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = path
            .extension()
            .map(|ext| ext == "yaml" || ext == "yml")
            .unwrap_or(false);
        let model = if is_yaml {
            Self::from_yaml(&text)?
        } else {
            Self::from_json(&text)?
        };

        tracing::debug!(
            path = %path.display(),
            hosts = model.hosts.len(),
            roles = model.roles.len(),
            users = model.users().len(),
            "Loaded privilege model"
        );
        Ok(model)
    }

    fn from_document(doc: PrivilegeDocument) -> Self {
        Self {
            global_admins: doc.global_admins,
            hosts: doc.users.per_host,
            roles: doc.users.roles,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builders
    // ─────────────────────────────────────────────────────────────────────────

    /// Declare a host with no grants.
    pub fn declare_host(&mut self, host: impl Into<HostId>) -> &mut Self {
        self.hosts.entry(host.into()).or_default();
        self
    }

    /// Declare a role with no grants.
    pub fn declare_role(&mut self, role: impl Into<RoleId>) -> &mut Self {
        self.roles.entry(role.into()).or_default();
        self
    }

    /// HostDirectGrant: `host` grants `user` the given privilege.
    pub fn grant_on_host(
        &mut self,
        host: impl Into<HostId>,
        user: impl Into<UserId>,
        privilege: impl Into<Privilege>,
    ) -> &mut Self {
        self.hosts
            .entry(host.into())
            .or_default()
            .enable
            .insert(user.into(), privilege.into());
        self
    }

    /// HostRoleEnable: `host` enables `role` for its members.
    pub fn enable_role_on_host(
        &mut self,
        host: impl Into<HostId>,
        role: impl Into<RoleId>,
    ) -> &mut Self {
        self.hosts
            .entry(host.into())
            .or_default()
            .enable_roles
            .insert(role.into());
        self
    }

    /// RoleDirectGrant: `role` grants `user` the given privilege.
    pub fn grant_in_role(
        &mut self,
        role: impl Into<RoleId>,
        user: impl Into<UserId>,
        privilege: impl Into<Privilege>,
    ) -> &mut Self {
        self.roles
            .entry(role.into())
            .or_default()
            .enable
            .insert(user.into(), privilege.into());
        self
    }

    /// RoleRoleEnable: `role` enables the grants of `enabled`.
    pub fn enable_role_in_role(
        &mut self,
        role: impl Into<RoleId>,
        enabled: impl Into<RoleId>,
    ) -> &mut Self {
        self.roles
            .entry(role.into())
            .or_default()
            .enable_roles
            .insert(enabled.into());
        self
    }

    /// Mark a user as global administrator.
    pub fn add_global_admin(&mut self, user: impl Into<UserId>) -> &mut Self {
        self.global_admins.insert(user.into());
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Users marked as global administrators.
    pub fn global_admins(&self) -> &BTreeSet<UserId> {
        &self.global_admins
    }

    /// Whether a user is a global administrator.
    pub fn is_global_admin(&self, user: &UserId) -> bool {
        self.global_admins.contains(user)
    }

    /// All declared hosts with their declarations.
    pub fn hosts(&self) -> impl Iterator<Item = (&HostId, &Declaration)> {
        self.hosts.iter()
    }

    /// All declared roles with their declarations.
    pub fn roles(&self) -> impl Iterator<Item = (&RoleId, &Declaration)> {
        self.roles.iter()
    }

    /// The declaration of a host.
    pub fn host(&self, host: &HostId) -> Option<&Declaration> {
        self.hosts.get(host)
    }

    /// The declaration of a role.
    pub fn role(&self, role: &RoleId) -> Option<&Declaration> {
        self.roles.get(role)
    }

    /// Whether a role is declared.
    pub fn has_role(&self, role: &RoleId) -> bool {
        self.roles.contains_key(role)
    }

    /// Every user mentioned in a grant or as global administrator.
    pub fn users(&self) -> BTreeSet<UserId> {
        self.hosts
            .values()
            .chain(self.roles.values())
            .flat_map(|decl| decl.enable.keys().cloned())
            .chain(self.global_admins.iter().cloned())
            .collect()
    }

    /// Every role mentioned anywhere, declared or not.
    pub fn role_names(&self) -> BTreeSet<RoleId> {
        self.roles
            .keys()
            .cloned()
            .chain(
                self.hosts
                    .values()
                    .chain(self.roles.values())
                    .flat_map(|decl| decl.enable_roles.iter().cloned()),
            )
            .collect()
    }

    /// Whether the model declares nothing at all.
    pub fn is_empty(&self) -> bool {
        self.global_admins.is_empty()
            && self.hosts.values().all(Declaration::is_empty)
            && self.roles.values().all(Declaration::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USERS_JSON: &str = r#"{
        "global_admins": ["alice"],
        "users": {
            "per-host": {
                "h1": { "enable": { "bob": "read" }, "enable_roles": ["ops"] },
                "h2": { "enable_roles": ["ops", "dev"] }
            },
            "roles": {
                "ops": { "enable": { "carol": "admin" } },
                "dev": { "enable": { "dave": "write" }, "enable_roles": ["ops"] }
            }
        },
        "unrelated": { "ignored": true }
    }"#;

    #[test]
    fn test_parse_json_document() {
        let model = PrivilegeModel::from_json(USERS_JSON).unwrap();

        assert!(model.is_global_admin(&UserId::from("alice")));
        let h1 = model.host(&HostId::from("h1")).unwrap();
        assert_eq!(h1.enable[&UserId::from("bob")], Privilege::from("read"));
        assert!(h1.enable_roles.contains(&RoleId::from("ops")));

        let dev = model.role(&RoleId::from("dev")).unwrap();
        assert!(dev.enable_roles.contains(&RoleId::from("ops")));

        let users: Vec<_> = model.users().into_iter().map(|u| u.to_string()).collect();
        assert_eq!(users, vec!["alice", "bob", "carol", "dave"]);
    }

    #[test]
    fn test_parse_yaml_document() {
        let yaml = "users:\n  per-host:\n    h1:\n      enable_roles: [admin]\n  roles:\n    admin:\n      enable:\n        alice: admin\n";
        let model = PrivilegeModel::from_yaml(yaml).unwrap();

        assert!(model.has_role(&RoleId::from("admin")));
        assert!(model.global_admins().is_empty());
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            PrivilegeModel::from_json(r#"{"users": {"roles": []}}"#),
            Err(PolicyError::Parse(_))
        ));
    }

    #[test]
    fn test_load_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.yaml");
        std::fs::write(&path, "global_admins: [root]\n").unwrap();

        let model = PrivilegeModel::load(&path).unwrap();
        assert!(model.is_global_admin(&UserId::from("root")));

        let missing = PrivilegeModel::load(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(PolicyError::Io { .. })));
    }

    #[test]
    fn test_builder_matches_document() {
        let mut built = PrivilegeModel::new();
        built
            .add_global_admin("alice")
            .grant_on_host("h1", "bob", "read")
            .enable_role_on_host("h1", "ops")
            .enable_role_on_host("h2", "ops")
            .enable_role_on_host("h2", "dev")
            .grant_in_role("ops", "carol", "admin")
            .grant_in_role("dev", "dave", "write")
            .enable_role_in_role("dev", "ops");

        assert_eq!(built, PrivilegeModel::from_json(USERS_JSON).unwrap());
    }
}
