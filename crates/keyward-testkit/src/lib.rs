//! # Keyward Testkit
//!
//! Testing utilities for keyward.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: deterministic key material, sample documents and an
//!   on-disk workspace layout in a temporary directory
//! - **Generators**: Proptest strategies for privilege models that resolve
//!   without conflict, together with a naive reference resolution
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use keyward_testkit::generators::{ModelParams, expected_privilege};
//!
//! proptest! {
//!     #[test]
//!     fn resolution_matches_reference(params: ModelParams) {
//!         let grants = keyward_policy::resolve(&params.model()).unwrap();
//!         // compare against expected_privilege(&params, user, host)
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use keyward_testkit::fixtures::{ssh_ed25519_line, TestFixture, SAMPLE_PRIVILEGES};
//!
//! let fixture = TestFixture::new();
//! fixture.write_privileges(SAMPLE_PRIVILEGES);
//! let line = ssh_ed25519_line(1, "alice@laptop");
//! assert!(line.starts_with("ssh-ed25519 "));
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{
    host_recipient, recipient, sample_key_access, sample_public_keys, ssh_ed25519_line,
    ssh_ed25519_recipient, StaticDeriver, TestFixture, SAMPLE_PRIVILEGES,
};
pub use generators::{expected_privilege, ModelParams};
