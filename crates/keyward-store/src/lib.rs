//! # Keyward Store
//!
//! The key-access document (`.sops.yaml`) and where it is persisted.
//!
//! ## Overview
//!
//! The document lists named age keys once, as YAML anchors, and refers to
//! them from each creation rule's key group by alias. This crate keeps those
//! cross-references stable: entries are identified by key name, untouched
//! entries are re-emitted byte for byte, and every rule is validated on load.
//!
//! ## Key Types
//!
//! - [`KeyAccessDocument`] - The whole document with unknown fields preserved
//! - [`KeyDirectory`] - Ordered, name-addressed key list
//! - [`AccessRuleSet`] - Ordered creation rules, one age key group each
//! - [`DocumentStore`] - Whole-document load/save
//! - [`FileStore`] - Atomic file persistence
//! - [`MemoryStore`] - In-memory store for tests
//!
//! ## Usage
//!
//! ```rust
//! use keyward_core::{AgeIdentity, HostId, KeyName};
//! use keyward_store::{DocumentStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let mut doc = store.load().unwrap();
//!
//! let recipient = AgeIdentity::generate().recipient().unwrap();
//! let key = KeyName::host(&HostId::from("h1")).unwrap();
//! doc.set_key(key.clone(), &recipient, false).unwrap();
//! doc.set_rule(r"^secrets/hosts/h1\.yaml$", &[key], false).unwrap();
//!
//! store.save(&doc).unwrap();
//! ```
//!
//! ## Design Notes
//!
//! - **Identity by name**: rules hold key names, never copies of key values
//! - **In-place replacement**: replacing a key or rule keeps its position
//! - **Fail on load**: a rule with other than one age-only key group, or a
//!   reference to an unknown key, makes the whole document unloadable

pub mod document;
pub mod error;
pub mod file;
pub mod keys;
pub mod memory;
pub mod rules;
pub mod traits;
pub mod yaml;

pub use document::KeyAccessDocument;
pub use error::{Result, StoreError};
pub use file::FileStore;
pub use keys::{KeyDirectory, KeyEntry, KeyOutcome};
pub use memory::MemoryStore;
pub use rules::{AccessRule, AccessRuleSet, RuleOutcome};
pub use traits::{DocumentStore, DocumentStoreExt};
pub use yaml::{Node, Scalar, ScalarStyle};
