//! Effective grant computation.
//!
//! Resolution turns the declared grants of a [`PrivilegeModel`] into one
//! unambiguous privilege per (user, host):
//!
//! 1. A direct host grant always wins.
//! 2. Otherwise every role enabled on the host contributes the grants of its
//!    *expanded* table (own grants plus the grants of every role it enables,
//!    transitively). Exactly one distinct privilege is effective; more than
//!    one is a [`PolicyError::Conflict`]; none means no access.
//!
//! Role expansion is a memoized depth-first walk. Grants inherited from
//! enabled roles replace the role's own grant for the same user, inherited
//! grants must agree, and cycles are rejected.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use keyward_core::{HostId, Privilege, RoleId, UserId};

use crate::error::{PolicyError, Result};
use crate::model::PrivilegeModel;

/// Expanded role table: role -> user -> privilege.
pub type RoleGrants = BTreeMap<RoleId, BTreeMap<UserId, Privilege>>;

/// Where an effective privilege comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "roles", rename_all = "snake_case")]
pub enum GrantSource {
    /// A direct host grant.
    Direct,
    /// Roles enabled on the host that all grant the same privilege.
    Roles(Vec<RoleId>),
}

/// The effective privilege of a user on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveGrant {
    /// The privilege that applies.
    pub privilege: Privilege,
    /// Where it comes from.
    pub source: GrantSource,
}

/// The result of resolving a privilege model.
///
/// Total and conflict-free by construction: resolution either yields this
/// table or fails as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveGrants {
    grants: BTreeMap<(UserId, HostId), EffectiveGrant>,
    roles: RoleGrants,
}

impl EffectiveGrants {
    /// The effective privilege of `user` on `host`, if any.
    pub fn get(&self, user: &UserId, host: &HostId) -> Option<&Privilege> {
        self.grant(user, host).map(|g| &g.privilege)
    }

    /// The effective grant of `user` on `host`, with its source.
    pub fn grant(&self, user: &UserId, host: &HostId) -> Option<&EffectiveGrant> {
        self.grants.get(&(user.clone(), host.clone()))
    }

    /// All effective grants ordered by (user, host).
    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &HostId, &EffectiveGrant)> {
        self.grants.iter().map(|((u, h), g)| (u, h, g))
    }

    /// Effective grants of one user, keyed by host.
    pub fn for_user(&self, user: &UserId) -> BTreeMap<&HostId, &Privilege> {
        self.grants
            .iter()
            .filter(|((u, _), _)| u == user)
            .map(|((_, h), g)| (h, &g.privilege))
            .collect()
    }

    /// Effective grants on one host, keyed by user.
    pub fn for_host(&self, host: &HostId) -> BTreeMap<&UserId, &Privilege> {
        self.grants
            .iter()
            .filter(|((_, h), _)| h == host)
            .map(|((u, _), g)| (u, &g.privilege))
            .collect()
    }

    /// The expanded privilege `role` grants `user`.
    pub fn role_privilege(&self, role: &RoleId, user: &UserId) -> Option<&Privilege> {
        self.roles.get(role).and_then(|users| users.get(user))
    }

    /// The expanded role table.
    pub fn roles(&self) -> &RoleGrants {
        &self.roles
    }

    /// Number of (user, host) pairs with an effective privilege.
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether no user has any effective privilege.
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

/// Resolve a privilege model into its effective grants.
pub fn resolve(model: &PrivilegeModel) -> Result<EffectiveGrants> {
    let roles = expand_roles(model)?;
    let mut grants = BTreeMap::new();

    for (host, decl) in model.hosts() {
        // Direct grants pass
        for (user, privilege) in &decl.enable {
            grants.insert(
                (user.clone(), host.clone()),
                EffectiveGrant {
                    privilege: privilege.clone(),
                    source: GrantSource::Direct,
                },
            );
        }

        // Host/role combination pass
        let mut candidates: BTreeMap<&UserId, BTreeMap<&Privilege, Vec<RoleId>>> = BTreeMap::new();
        for role in &decl.enable_roles {
            let Some(users) = roles.get(role) else {
                tracing::warn!(host = %host, role = %role, "Host enables undeclared role");
                continue;
            };
            for (user, privilege) in users {
                if decl.enable.contains_key(user) {
                    continue;
                }
                candidates
                    .entry(user)
                    .or_default()
                    .entry(privilege)
                    .or_default()
                    .push(role.clone());
            }
        }

        for (user, mut by_privilege) in candidates {
            if by_privilege.len() > 1 {
                return Err(PolicyError::Conflict {
                    user: user.clone(),
                    host: host.clone(),
                    privileges: by_privilege.into_keys().cloned().collect(),
                });
            }
            if let Some((privilege, granting)) = by_privilege.pop_first() {
                grants.insert(
                    (user.clone(), host.clone()),
                    EffectiveGrant {
                        privilege: privilege.clone(),
                        source: GrantSource::Roles(granting),
                    },
                );
            }
        }
    }

    tracing::debug!(
        grants = grants.len(),
        roles = roles.len(),
        "Resolved effective privileges"
    );

    Ok(EffectiveGrants { grants, roles })
}

/// Expand every declared role into its transitive user table.
pub fn expand_roles(model: &PrivilegeModel) -> Result<RoleGrants> {
    let mut expander = Expander {
        model,
        done: BTreeMap::new(),
        stack: Vec::new(),
    };
    for (role, _) in model.roles() {
        expander.expand(role)?;
    }
    Ok(expander.done)
}

struct Expander<'a> {
    model: &'a PrivilegeModel,
    done: RoleGrants,
    stack: Vec<RoleId>,
}

impl Expander<'_> {
    fn expand(&mut self, role: &RoleId) -> Result<()> {
        if self.done.contains_key(role) {
            return Ok(());
        }
        if let Some(pos) = self.stack.iter().position(|r| r == role) {
            let mut path: Vec<&str> = self.stack[pos..].iter().map(RoleId::as_str).collect();
            path.push(role.as_str());
            return Err(PolicyError::RoleCycle(path.join(" -> ")));
        }

        let model = self.model;
        let Some(decl) = model.role(role) else {
            return Ok(());
        };

        self.stack.push(role.clone());
        for enabled in &decl.enable_roles {
            if !model.has_role(enabled) {
                return Err(PolicyError::UnknownRole {
                    role: enabled.clone(),
                    referenced_by: role.clone(),
                });
            }
            self.expand(enabled)?;
        }
        self.stack.pop();

        let mut inherited: BTreeMap<&UserId, BTreeSet<&Privilege>> = BTreeMap::new();
        for enabled in &decl.enable_roles {
            if let Some(users) = self.done.get(enabled) {
                for (user, privilege) in users {
                    inherited.entry(user).or_default().insert(privilege);
                }
            }
        }

        let mut table = decl.enable.clone();
        for (user, privileges) in inherited {
            if privileges.len() > 1 {
                return Err(PolicyError::RoleConflict {
                    user: user.clone(),
                    role: role.clone(),
                    privileges: privileges.into_iter().cloned().collect(),
                });
            }
            if let Some(privilege) = privileges.into_iter().next() {
                if let Some(own) = table.insert(user.clone(), privilege.clone()) {
                    if &own != privilege {
                        tracing::debug!(
                            role = %role,
                            user = %user,
                            own = %own,
                            inherited = %privilege,
                            "Inherited grant replaces own role grant"
                        );
                    }
                }
            }
        }

        self.done.insert(role.clone(), table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(name: &str) -> UserId {
        UserId::from(name)
    }

    fn host(name: &str) -> HostId {
        HostId::from(name)
    }

    #[test]
    fn test_role_grant_reaches_host() {
        let mut model = PrivilegeModel::new();
        model
            .enable_role_on_host("h1", "admin")
            .grant_in_role("admin", "alice", "admin");

        let grants = resolve(&model).unwrap();
        assert_eq!(
            grants.get(&user("alice"), &host("h1")),
            Some(&Privilege::from("admin"))
        );
        assert_eq!(
            grants.grant(&user("alice"), &host("h1")).unwrap().source,
            GrantSource::Roles(vec![RoleId::from("admin")])
        );
    }

    #[test]
    fn test_conflicting_roles_fail() {
        let mut model = PrivilegeModel::new();
        model
            .enable_role_on_host("h1", "roleA")
            .enable_role_on_host("h1", "roleB")
            .grant_in_role("roleA", "bob", "read")
            .grant_in_role("roleB", "bob", "write");

        match resolve(&model) {
            Err(PolicyError::Conflict {
                user: u,
                host: h,
                privileges,
            }) => {
                assert_eq!(u, user("bob"));
                assert_eq!(h, host("h1"));
                assert_eq!(privileges.len(), 2);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_agreeing_roles_do_not_conflict() {
        let mut model = PrivilegeModel::new();
        model
            .enable_role_on_host("h1", "roleA")
            .enable_role_on_host("h1", "roleB")
            .grant_in_role("roleA", "bob", "read")
            .grant_in_role("roleB", "bob", "read");

        let grants = resolve(&model).unwrap();
        assert_eq!(
            grants.grant(&user("bob"), &host("h1")).unwrap().source,
            GrantSource::Roles(vec![RoleId::from("roleA"), RoleId::from("roleB")])
        );
    }

    #[test]
    fn test_direct_grant_wins_over_conflicting_roles() {
        let mut model = PrivilegeModel::new();
        model
            .grant_on_host("h1", "bob", "none")
            .enable_role_on_host("h1", "roleA")
            .enable_role_on_host("h1", "roleB")
            .grant_in_role("roleA", "bob", "read")
            .grant_in_role("roleB", "bob", "write");

        let grants = resolve(&model).unwrap();
        let grant = grants.grant(&user("bob"), &host("h1")).unwrap();
        assert_eq!(grant.privilege, Privilege::from("none"));
        assert_eq!(grant.source, GrantSource::Direct);
    }

    #[test]
    fn test_expansion_follows_chains_regardless_of_order() {
        // "a" sorts before "b" and "c", so a single ordered pass would miss the chain
        let mut model = PrivilegeModel::new();
        model
            .enable_role_on_host("h1", "a")
            .enable_role_in_role("a", "b")
            .enable_role_in_role("b", "c")
            .grant_in_role("c", "carol", "read");

        let grants = resolve(&model).unwrap();
        assert_eq!(
            grants.get(&user("carol"), &host("h1")),
            Some(&Privilege::from("read"))
        );
        assert_eq!(
            grants.role_privilege(&RoleId::from("a"), &user("carol")),
            Some(&Privilege::from("read"))
        );
    }

    #[test]
    fn test_inherited_grant_replaces_own_role_grant() {
        let mut model = PrivilegeModel::new();
        model
            .grant_in_role("lead", "erin", "admin")
            .enable_role_in_role("lead", "member")
            .grant_in_role("member", "erin", "read")
            .enable_role_on_host("h1", "lead");

        let grants = resolve(&model).unwrap();
        assert_eq!(
            grants.role_privilege(&RoleId::from("lead"), &user("erin")),
            Some(&Privilege::from("read"))
        );
        assert_eq!(
            grants.get(&user("erin"), &host("h1")),
            Some(&Privilege::from("read"))
        );
    }

    #[test]
    fn test_inherited_conflict_inside_role() {
        let mut model = PrivilegeModel::new();
        model
            .enable_role_in_role("lead", "x")
            .enable_role_in_role("lead", "y")
            .grant_in_role("x", "erin", "read")
            .grant_in_role("y", "erin", "write");

        assert!(matches!(
            resolve(&model),
            Err(PolicyError::RoleConflict { .. })
        ));
    }

    #[test]
    fn test_role_cycle_is_rejected() {
        let mut model = PrivilegeModel::new();
        model
            .enable_role_in_role("a", "b")
            .enable_role_in_role("b", "c")
            .enable_role_in_role("c", "a");

        match resolve(&model) {
            Err(PolicyError::RoleCycle(path)) => assert_eq!(path, "a -> b -> c -> a"),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_role_references() {
        let mut model = PrivilegeModel::new();
        model.enable_role_in_role("a", "ghost");
        assert!(matches!(
            resolve(&model),
            Err(PolicyError::UnknownRole { .. })
        ));

        // A host enabling an undeclared role simply gains nothing
        let mut model = PrivilegeModel::new();
        model
            .enable_role_on_host("h1", "ghost")
            .grant_on_host("h1", "bob", "read");
        let grants = resolve(&model).unwrap();
        assert_eq!(grants.len(), 1);
    }

    #[test]
    fn test_users_without_grants_are_absent() {
        let mut model = PrivilegeModel::new();
        model
            .enable_role_on_host("h1", "ops")
            .grant_in_role("ops", "alice", "admin")
            .grant_on_host("h2", "bob", "read");

        let grants = resolve(&model).unwrap();
        assert_eq!(grants.get(&user("alice"), &host("h2")), None);
        assert_eq!(grants.get(&user("bob"), &host("h1")), None);
        assert_eq!(grants.for_user(&user("alice")).len(), 1);
        assert_eq!(grants.for_host(&host("h2")).len(), 1);
    }

    proptest! {
        #[test]
        fn prop_direct_grants_always_win(
            direct in prop::collection::vec((0..4usize, 0..3usize, 0..3usize), 0..12),
            via_role in prop::collection::vec((0..4usize, 0..3usize), 0..12),
        ) {
            const PRIVS: [&str; 3] = ["read", "write", "admin"];
            let mut model = PrivilegeModel::new();
            for (u, h, p) in &direct {
                model.grant_on_host(format!("h{h}").as_str(), format!("u{u}").as_str(), PRIVS[*p]);
            }
            // One role per host, each granting a single privilege, so no conflicts arise
            for (u, h) in &via_role {
                let role = format!("r{h}");
                model
                    .enable_role_on_host(format!("h{h}").as_str(), role.as_str())
                    .grant_in_role(role.as_str(), format!("u{u}").as_str(), "none");
            }

            let grants = resolve(&model).unwrap();
            for (host, decl) in model.hosts() {
                for (user, privilege) in &decl.enable {
                    prop_assert_eq!(grants.get(user, host), Some(privilege));
                }
            }
            for (user, host, grant) in grants.iter() {
                if grant.source != GrantSource::Direct {
                    prop_assert_eq!(grant.privilege.as_str(), "none");
                    prop_assert!(!model.host(host).unwrap().enable.contains_key(user));
                }
            }
        }
    }
}
