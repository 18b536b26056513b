//! # Keyward
//!
//! Decides who may decrypt which secret files, and keeps the SOPS key-access
//! document (`.sops.yaml`) in line with that decision.
//!
//! ## Overview
//!
//! Keyward provides:
//!
//! - **Resolution**: the declared host/role/user privilege model becomes one
//!   unambiguous privilege per (user, host), or fails on conflict
//! - **Sync**: published SSH keys become age recipients, and every creation
//!   rule's user keys are recomputed from the resolved privileges
//! - **Maintenance**: keys and rules can be listed, set and deleted by hand
//! - **Enrollment**: a host gets its own key and a rule for its secrets file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyward::{Keyward, Settings};
//!
//! let settings = Settings::load("keyward.toml").unwrap();
//! let keyward = Keyward::open(settings);
//!
//! let report = keyward.sync_users(true).unwrap();
//! println!("would change: {}", report.reconcile.changed());
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `keyward::core` - Identifiers and key material
//! - `keyward::policy` - Privilege model, resolution and audit
//! - `keyward::store` - The key-access document and its stores
//! - `keyward::sync` - Key derivation and reconciliation

pub mod config;
pub mod error;
pub mod workspace;

// Re-export component crates
pub use keyward_core as core;
pub use keyward_policy as policy;
pub use keyward_store as store;
pub use keyward_sync as sync;

// Re-export main types for convenience
pub use config::{AccessSettings, DeriveBackend, DeriveSettings, PathSettings, Settings};
pub use error::{KeywardError, Result};
pub use workspace::{host_rule_pattern, EnrollReport, HostKeySource, Keyward, SyncReport};

// Re-export commonly used component types
pub use keyward_core::{AgeRecipient, HostId, KeyName, KeyOwner, Privilege, RoleId, UserId};
pub use keyward_policy::{AuditReport, EffectiveGrants, PolicyError, PrivilegeModel};
pub use keyward_store::{DocumentStore, FileStore, KeyAccessDocument, MemoryStore, StoreError};
