//! Proptest generators for property-based testing.
//!
//! Generated models are acyclic (a role only enables roles with a higher
//! index) and free of role conflicts (every user has one privilege it is
//! granted through any role). Direct host grants may use any privilege.

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use keyward_core::{HostId, Privilege, RoleId, UserId};
use keyward_policy::PrivilegeModel;

const USERS: [&str; 5] = ["alice", "bob", "carol", "dave", "erin"];
const PRIVILEGES: [&str; 3] = ["admin", "write", "read"];

/// Generate a privilege label.
pub fn privilege() -> impl Strategy<Value = Privilege> {
    prop::sample::select(PRIVILEGES.to_vec()).prop_map(Privilege::from)
}

/// Generate a user from a small fixed population.
pub fn user() -> impl Strategy<Value = UserId> {
    prop::sample::select(USERS.to_vec()).prop_map(UserId::from)
}

/// Declarations of one role, by index.
#[derive(Debug, Clone)]
pub struct RoleParams {
    /// Users this role grants their role privilege to.
    pub grants: BTreeSet<usize>,
    /// Roles with a higher index this role enables.
    pub enables: BTreeSet<usize>,
}

/// Declarations of one host, by index.
#[derive(Debug, Clone)]
pub struct HostParams {
    pub direct: BTreeMap<usize, Privilege>,
    pub roles: BTreeSet<usize>,
}

/// Parameters for generating a privilege model.
#[derive(Debug, Clone)]
pub struct ModelParams {
    /// The single privilege each user receives through any role.
    pub role_privileges: Vec<Privilege>,
    pub roles: Vec<RoleParams>,
    pub hosts: Vec<HostParams>,
}

fn role_params(index: usize, role_count: usize) -> impl Strategy<Value = RoleParams> {
    let enables = if index + 1 < role_count {
        index_set(index + 1..role_count).boxed()
    } else {
        Just(BTreeSet::new()).boxed()
    };
    (index_set(0..USERS.len()), enables).prop_map(|(grants, enables)| RoleParams { grants, enables })
}

/// Up to three indices from `range`; duplicates collapse.
fn index_set(range: std::ops::Range<usize>) -> impl Strategy<Value = BTreeSet<usize>> {
    prop::collection::vec(range, 0..4).prop_map(|v| v.into_iter().collect())
}

fn host_params(role_count: usize) -> impl Strategy<Value = HostParams> {
    (
        prop::collection::btree_map(0..USERS.len(), privilege(), 0..3),
        index_set(0..role_count),
    )
        .prop_map(|(direct, roles)| HostParams { direct, roles })
}

impl Arbitrary for ModelParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (1usize..6, 1usize..5)
            .prop_flat_map(|(role_count, host_count)| {
                let roles: Vec<_> = (0..role_count)
                    .map(|i| role_params(i, role_count).boxed())
                    .collect();
                (
                    prop::collection::vec(privilege(), USERS.len()),
                    roles,
                    prop::collection::vec(host_params(role_count), host_count),
                )
            })
            .prop_map(|(role_privileges, roles, hosts)| ModelParams {
                role_privileges,
                roles,
                hosts,
            })
            .boxed()
    }
}

impl ModelParams {
    pub fn role_id(index: usize) -> RoleId {
        RoleId::new(format!("role{index}"))
    }

    pub fn host_id(index: usize) -> HostId {
        HostId::new(format!("host{index}"))
    }

    pub fn user_id(index: usize) -> UserId {
        UserId::from(USERS[index])
    }

    /// All users that may appear in the model.
    pub fn users() -> Vec<UserId> {
        (0..USERS.len()).map(Self::user_id).collect()
    }

    /// All hosts of the model.
    pub fn host_ids(&self) -> Vec<HostId> {
        (0..self.hosts.len()).map(Self::host_id).collect()
    }

    /// Build the privilege model.
    pub fn model(&self) -> PrivilegeModel {
        let mut model = PrivilegeModel::new();
        for (i, role) in self.roles.iter().enumerate() {
            model.declare_role(Self::role_id(i));
            for &u in &role.grants {
                model.grant_in_role(Self::role_id(i), Self::user_id(u), self.role_privileges[u].clone());
            }
            for &r in &role.enables {
                model.enable_role_in_role(Self::role_id(i), Self::role_id(r));
            }
        }
        for (i, host) in self.hosts.iter().enumerate() {
            model.declare_host(Self::host_id(i));
            for (&u, privilege) in &host.direct {
                model.grant_on_host(Self::host_id(i), Self::user_id(u), privilege.clone());
            }
            for &r in &host.roles {
                model.enable_role_on_host(Self::host_id(i), Self::role_id(r));
            }
        }
        model
    }

    /// Roles reachable from `role`, including itself.
    fn reachable(&self, role: usize, seen: &mut BTreeSet<usize>) {
        if seen.insert(role) {
            for &next in &self.roles[role].enables {
                self.reachable(next, seen);
            }
        }
    }
}

/// The privilege `user` should have on `host`, computed naively from the
/// parameters rather than from the model.
pub fn expected_privilege(params: &ModelParams, user: usize, host: usize) -> Option<Privilege> {
    let decl = &params.hosts[host];
    if let Some(privilege) = decl.direct.get(&user) {
        return Some(privilege.clone());
    }

    let mut reachable = BTreeSet::new();
    for &role in &decl.roles {
        params.reachable(role, &mut reachable);
    }
    reachable
        .iter()
        .any(|&role| params.roles[role].grants.contains(&user))
        .then(|| params.role_privileges[user].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_policy::resolve;

    proptest! {
        #[test]
        fn test_generated_models_resolve(params: ModelParams) {
            let model = params.model();
            let first = resolve(&model);
            prop_assert!(first.is_ok(), "{:?}", first.as_ref().err());
            prop_assert_eq!(first.ok(), resolve(&model).ok());
        }

        #[test]
        fn test_reference_matches_resolution(params: ModelParams) {
            let grants = resolve(&params.model()).unwrap();
            for (h, host) in params.host_ids().iter().enumerate() {
                for (u, user) in ModelParams::users().iter().enumerate() {
                    prop_assert_eq!(
                        grants.get(user, host).cloned(),
                        expected_privilege(&params, u, h)
                    );
                }
            }
        }
    }
}
