//! # Keyward Policy
//!
//! The privilege model and its resolution into effective grants.
//!
//! ## Overview
//!
//! Hosts and roles both *declare* grants: a direct privilege for a user, or
//! the enabling of a role whose grants then apply. Resolution computes, for
//! every (user, host), the single privilege in force:
//!
//! - A direct host grant always wins
//! - Otherwise roles enabled on the host must agree (after transitive
//!   expansion through role-to-role enables)
//! - Disagreement is a [`PolicyError::Conflict`], never a silent pick
//!
//! ## Usage
//!
//! ```rust
//! use keyward_core::{HostId, Privilege, UserId};
//! use keyward_policy::{resolve, PrivilegeModel};
//!
//! let mut model = PrivilegeModel::new();
//! model
//!     .enable_role_on_host("h1", "admin")
//!     .grant_in_role("admin", "alice", "admin");
//!
//! let grants = resolve(&model).unwrap();
//! assert_eq!(
//!     grants.get(&UserId::from("alice"), &HostId::from("h1")),
//!     Some(&Privilege::from("admin"))
//! );
//! ```

pub mod access;
pub mod audit;
pub mod error;
pub mod model;
pub mod resolve;

pub use access::{AccessPolicy, AdminAccess};
pub use audit::{AuditReport, UserHostTable};
pub use error::{PolicyError, Result};
pub use model::{Declaration, PrivilegeModel};
pub use resolve::{expand_roles, resolve, EffectiveGrant, EffectiveGrants, GrantSource, RoleGrants};
