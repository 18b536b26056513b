//! # Keyward Core
//!
//! Pure primitives shared by every keyward crate: principal identifiers,
//! key names and the age key material they refer to.
//!
//! This crate contains no I/O. It is pure computation over identifiers and
//! key material.
//!
//! ## Key Types
//!
//! - [`HostId`], [`RoleId`], [`UserId`] - Principals of the privilege model
//! - [`Privilege`] - Opaque privilege label, only compared for equality
//! - [`KeyName`] - Name of an entry in the key directory (`host_*` / `user_*`)
//! - [`AgeRecipient`] - A validated age X25519 recipient (`age1...`)
//! - [`AgeIdentity`] - A freshly generated age secret key
//! - [`Fingerprint`] - Blake3 digest of a persisted document

pub mod crypto;
pub mod error;
pub mod types;

pub use crypto::{AgeIdentity, AgeRecipient, Fingerprint};
pub use error::{CoreError, Result};
pub use types::{HostId, KeyName, KeyOwner, Privilege, RoleId, UserId};
