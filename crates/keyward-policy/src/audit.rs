//! Audit tables.
//!
//! Four views of the privilege model meant for human review: direct grants
//! per host, roles enabled per host, expanded role grants, and effective
//! grants. Rendering (JSON, spreadsheets) is left to the caller.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use keyward_core::{HostId, Privilege, RoleId, UserId};

use crate::model::PrivilegeModel;
use crate::resolve::{EffectiveGrants, RoleGrants};

/// User -> host -> privilege.
pub type UserHostTable = BTreeMap<UserId, BTreeMap<HostId, Privilege>>;

/// The audit tables of a resolved model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    /// Every user mentioned anywhere.
    pub users: BTreeSet<UserId>,
    /// Every declared host.
    pub hosts: BTreeSet<HostId>,
    /// Every role mentioned anywhere.
    pub roles: BTreeSet<RoleId>,

    /// Direct host grants.
    pub direct_user_host_privileges: UserHostTable,

    /// Roles enabled directly on each host.
    pub role_host_enabled: BTreeMap<HostId, BTreeSet<RoleId>>,

    /// Expanded role grants.
    pub user_privileges_per_role: RoleGrants,

    /// Effective grants.
    pub effective_user_host_privileges: UserHostTable,
}

impl AuditReport {
    /// Build the audit tables.
    pub fn build(model: &PrivilegeModel, grants: &EffectiveGrants) -> Self {
        let mut report = AuditReport {
            users: model.users(),
            roles: model.role_names(),
            user_privileges_per_role: grants.roles().clone(),
            ..Default::default()
        };

        for (host, decl) in model.hosts() {
            report.hosts.insert(host.clone());
            for (user, privilege) in &decl.enable {
                report
                    .direct_user_host_privileges
                    .entry(user.clone())
                    .or_default()
                    .insert(host.clone(), privilege.clone());
            }
            if !decl.enable_roles.is_empty() {
                report
                    .role_host_enabled
                    .insert(host.clone(), decl.enable_roles.clone());
            }
        }

        for (user, host, grant) in grants.iter() {
            report
                .effective_user_host_privileges
                .entry(user.clone())
                .or_default()
                .insert(host.clone(), grant.privilege.clone());
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve;

    #[test]
    fn test_audit_tables() {
        let mut model = PrivilegeModel::new();
        model
            .grant_on_host("h1", "bob", "read")
            .enable_role_on_host("h2", "ops")
            .grant_in_role("ops", "carol", "admin");

        let grants = resolve(&model).unwrap();
        let report = AuditReport::build(&model, &grants);

        assert_eq!(report.hosts.len(), 2);
        assert_eq!(report.direct_user_host_privileges.len(), 1);
        assert_eq!(
            report.role_host_enabled[&HostId::from("h2")],
            BTreeSet::from([RoleId::from("ops")])
        );
        assert_eq!(
            report.effective_user_host_privileges[&UserId::from("carol")][&HostId::from("h2")],
            Privilege::from("admin")
        );
        assert!(!report
            .effective_user_host_privileges
            .contains_key(&UserId::from("dave")));
    }
}
