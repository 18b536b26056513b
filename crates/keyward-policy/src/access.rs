//! Secret access predicates.
//!
//! Decides which users may decrypt the secret files matched by an access
//! rule. The only policy in use today treats administrators as having access
//! to every rule.

use std::collections::BTreeSet;

use keyward_core::{Privilege, RoleId, UserId};

use crate::model::PrivilegeModel;
use crate::resolve::EffectiveGrants;

/// Decides whether a user may decrypt secrets matched by a path pattern.
pub trait AccessPolicy {
    /// Whether `user` may decrypt files matching `path_regex`.
    fn can_decrypt(&self, user: &UserId, path_regex: &str) -> bool;
}

/// Administrators may decrypt everything.
///
/// A user is an administrator if they are a global administrator, or if the
/// configured catch-all role grants them the configured privilege.
#[derive(Debug, Clone)]
pub struct AdminAccess {
    admins: BTreeSet<UserId>,
}

impl AdminAccess {
    /// Default catch-all administrative role.
    pub const DEFAULT_ROLE: &'static str = "devops_common";

    /// Default administrative privilege label.
    pub const DEFAULT_PRIVILEGE: &'static str = "admin";

    /// Compute the administrator set.
    pub fn new(
        model: &PrivilegeModel,
        grants: &EffectiveGrants,
        admin_role: &RoleId,
        admin_privilege: &Privilege,
    ) -> Self {
        let role_admins = grants
            .roles()
            .get(admin_role)
            .into_iter()
            .flat_map(|users| users.iter())
            .filter(|(_, privilege)| *privilege == admin_privilege)
            .map(|(user, _)| user.clone());

        let admins: BTreeSet<UserId> = model
            .global_admins()
            .iter()
            .cloned()
            .chain(role_admins)
            .collect();

        tracing::debug!(admins = admins.len(), role = %admin_role, "Computed administrator set");
        Self { admins }
    }

    /// The administrator set.
    pub fn admins(&self) -> &BTreeSet<UserId> {
        &self.admins
    }
}

impl AccessPolicy for AdminAccess {
    fn can_decrypt(&self, user: &UserId, _path_regex: &str) -> bool {
        self.admins.contains(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve;

    #[test]
    fn test_global_and_role_admins() {
        let mut model = PrivilegeModel::new();
        model
            .add_global_admin("alice")
            .grant_in_role("devops_common", "bob", "admin")
            .grant_in_role("devops_common", "carol", "read")
            .grant_in_role("other", "dave", "admin");

        let grants = resolve(&model).unwrap();
        let access = AdminAccess::new(
            &model,
            &grants,
            &RoleId::from(AdminAccess::DEFAULT_ROLE),
            &Privilege::from(AdminAccess::DEFAULT_PRIVILEGE),
        );

        assert!(access.can_decrypt(&UserId::from("alice"), ".*"));
        assert!(access.can_decrypt(&UserId::from("bob"), ".*"));
        assert!(!access.can_decrypt(&UserId::from("carol"), ".*"));
        assert!(!access.can_decrypt(&UserId::from("dave"), ".*"));
    }

    #[test]
    fn test_inherited_admin_privilege_counts() {
        let mut model = PrivilegeModel::new();
        model
            .enable_role_in_role("devops_common", "sre")
            .grant_in_role("sre", "erin", "admin");

        let grants = resolve(&model).unwrap();
        let access = AdminAccess::new(
            &model,
            &grants,
            &RoleId::from("devops_common"),
            &Privilege::from("admin"),
        );

        assert!(access.can_decrypt(&UserId::from("erin"), "^secrets/.*"));
    }

    #[test]
    fn test_inherited_grant_overrides_own_admin_grant() {
        let mut model = PrivilegeModel::new();
        model
            .grant_in_role("devops_common", "erin", "admin")
            .enable_role_in_role("devops_common", "sre")
            .grant_in_role("sre", "erin", "read");

        let grants = resolve(&model).unwrap();
        let access = AdminAccess::new(
            &model,
            &grants,
            &RoleId::from("devops_common"),
            &Privilege::from("admin"),
        );

        assert!(!access.can_decrypt(&UserId::from("erin"), "^secrets/.*"));
    }
}
