//! # Keyward Sync
//!
//! Keeps the key-access document in line with the people who should be able
//! to decrypt secrets.
//!
//! ## Overview
//!
//! A sync run has two halves:
//!
//! - **Derivation**: every SSH public key a user publishes is converted to
//!   an age recipient by a [`KeyDeriver`], either the external `ssh-to-age`
//!   program ([`SshToAgeCommand`]) or in process ([`NativeDeriver`]).
//! - **Reconciliation**: the derived keys are written to the key directory,
//!   and the user part of every rule's key group is recomputed from an
//!   [`AccessPolicy`](keyward_policy::AccessPolicy).
//!
//! Host keys in rules are managed by enrollment, never by a sync run.
//!
//! ## Usage
//!
//! ```rust
//! use keyward_core::{AgeIdentity, HostId, KeyName, UserId};
//! use keyward_policy::AccessPolicy;
//! use keyward_store::KeyAccessDocument;
//! use keyward_sync::{reconcile, DerivedKey};
//!
//! struct Everyone;
//!
//! impl AccessPolicy for Everyone {
//!     fn can_decrypt(&self, _user: &UserId, _path_regex: &str) -> bool {
//!         true
//!     }
//! }
//!
//! let mut document = KeyAccessDocument::new();
//! let host = KeyName::host(&HostId::from("h1")).unwrap();
//! let host_recipient = AgeIdentity::generate().recipient().unwrap();
//! document.set_key(host.clone(), &host_recipient, false).unwrap();
//! document.set_rule(r"^secrets/hosts/h1\.yaml$", &[host], false).unwrap();
//!
//! let alice = UserId::from("alice");
//! let derived = [DerivedKey {
//!     name: KeyName::user(&alice, 0).unwrap(),
//!     user: alice,
//!     recipient: AgeIdentity::generate().recipient().unwrap(),
//! }];
//!
//! let report = reconcile(&mut document, &derived, &Everyone).unwrap();
//! assert!(report.changed());
//! assert_eq!(report.rules_changed[0].added[0].as_str(), "user_alice");
//! ```

pub mod derive;
pub mod error;
pub mod reconcile;

pub use derive::{
    derive_all, Derivation, DerivedKey, DerivedKeys, KeyDeriver, NativeDeriver,
    PublicKeyDocument, PublicKeyEntry, SkippedKey, SshToAgeCommand, UserKeys,
};
pub use error::{Result, SyncError};
pub use reconcile::{reconcile, ReconcileReport, RuleChange};
