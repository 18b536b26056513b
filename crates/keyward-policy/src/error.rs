//! Error types for the privilege policy module.

use std::path::PathBuf;

use keyward_core::{HostId, Privilege, RoleId, UserId};
use thiserror::Error;

/// Errors that can occur while loading or resolving a privilege model.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A user gets more than one distinct privilege on a host via roles.
    #[error("user {user} has conflicting privileges on host {host}: {}", join(.privileges))]
    Conflict {
        user: UserId,
        host: HostId,
        privileges: Vec<Privilege>,
    },

    /// A role inherits more than one distinct privilege for a user.
    #[error("user {user} inherits conflicting privileges in role {role}: {}", join(.privileges))]
    RoleConflict {
        user: UserId,
        role: RoleId,
        privileges: Vec<Privilege>,
    },

    /// Roles enable each other in a cycle.
    #[error("cyclic role enablement: {0}")]
    RoleCycle(String),

    /// A role enables a role that is not declared.
    #[error("role {referenced_by} enables undeclared role {role}")]
    UnknownRole { role: RoleId, referenced_by: RoleId },

    /// The declaration document could not be read.
    #[error("failed to read privilege document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The declaration document is malformed.
    #[error("failed to parse privilege document: {0}")]
    Parse(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] keyward_core::CoreError),
}

fn join(privileges: &[Privilege]) -> String {
    privileges
        .iter()
        .map(Privilege::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
