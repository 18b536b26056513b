//! Strong type definitions for keyward.
//!
//! Hosts, roles, users and privileges are all plain strings in the declaration
//! documents. They are newtypes here so a host can never be passed where a
//! user is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier without validation.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Parse an identifier, rejecting empty strings.
            pub fn parse(value: &str) -> Result<Self> {
                if value.is_empty() {
                    return Err(CoreError::EmptyIdentifier($kind));
                }
                Ok(Self(value.to_string()))
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// A host of the fleet, e.g. `demo-server-1`.
    HostId,
    "host"
);

string_id!(
    /// A role that groups user grants and can enable other roles.
    RoleId,
    "role"
);

string_id!(
    /// A human user of the fleet.
    UserId,
    "user"
);

string_id!(
    /// An opaque privilege label such as `admin` or `read`.
    ///
    /// No structure is interpreted beyond equality.
    Privilege,
    "privilege"
);

impl Privilege {
    /// Check whether this privilege carries the given label.
    pub fn is(&self, label: &str) -> bool {
        self.0 == label
    }
}

/// Who owns a key, decided by the key name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyOwner {
    /// System-managed key of a host (`host_` prefix).
    Host,
    /// Policy-managed key of a user (`user_` prefix).
    User,
}

impl KeyOwner {
    /// The name prefix for keys owned by this kind of principal.
    pub const fn prefix(self) -> &'static str {
        match self {
            KeyOwner::Host => "host_",
            KeyOwner::User => "user_",
        }
    }
}

/// Characters that cannot appear in a key name.
///
/// Key names double as YAML anchors, which end at whitespace and cannot hold
/// flow indicators.
fn is_anchor_char(c: char) -> bool {
    !c.is_whitespace() && !c.is_control() && !matches!(c, ',' | '[' | ']' | '{' | '}')
}

/// The name of a key directory entry.
///
/// Always starts with `host_` or `user_` and is usable as a YAML anchor.
/// Users may own several keys; the first is named `user_<name>`, the n-th
/// (n >= 2) `user_<name>_<n>`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyName {
    name: String,
    owner: KeyOwner,
}

impl KeyName {
    /// Parse a key name, checking the owner prefix and the anchor characters.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = |reason: &'static str| CoreError::InvalidKeyName {
            name: name.to_string(),
            reason,
        };

        let owner = if name.starts_with(KeyOwner::Host.prefix()) {
            KeyOwner::Host
        } else if name.starts_with(KeyOwner::User.prefix()) {
            KeyOwner::User
        } else {
            return Err(invalid("must start with `host_` or `user_`"));
        };

        if name.len() == owner.prefix().len() {
            return Err(invalid("empty principal"));
        }
        if !name.chars().all(is_anchor_char) {
            return Err(invalid("whitespace, control characters and `,[]{}` are not allowed"));
        }

        Ok(Self {
            name: name.to_string(),
            owner,
        })
    }

    /// The key name of a host.
    pub fn host(host: &HostId) -> Result<Self> {
        Self::parse(&format!("{}{}", KeyOwner::Host.prefix(), host))
    }

    /// The key name of a user's `index`-th public key (zero based).
    pub fn user(user: &UserId, index: usize) -> Result<Self> {
        if index == 0 {
            Self::parse(&format!("{}{}", KeyOwner::User.prefix(), user))
        } else {
            Self::parse(&format!("{}{}_{}", KeyOwner::User.prefix(), user, index + 1))
        }
    }

    /// Borrow the full name.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Who owns this key.
    pub fn owner(&self) -> KeyOwner {
        self.owner
    }

    /// Whether this is a system-managed host key.
    pub fn is_host(&self) -> bool {
        self.owner == KeyOwner::Host
    }

    /// Whether this is a policy-managed user key.
    pub fn is_user(&self) -> bool {
        self.owner == KeyOwner::User
    }

    /// The name without its owner prefix.
    pub fn principal(&self) -> &str {
        &self.name[self.owner.prefix().len()..]
    }

    /// Every user this key name could have been generated for.
    ///
    /// `user_bob_2` is either the first key of `bob_2` or the second key of
    /// `bob`, so both are returned, exact reading first. Host keys have no
    /// user owners.
    pub fn possible_users(&self) -> Vec<UserId> {
        if self.is_host() {
            return Vec::new();
        }
        let rest = self.principal();
        let mut users = vec![UserId::new(rest)];
        if let Some((base, index)) = rest.rsplit_once('_') {
            let indexed = !base.is_empty()
                && !index.is_empty()
                && index.bytes().all(|b| b.is_ascii_digit())
                && index.parse::<usize>().map_or(false, |n| n >= 2);
            if indexed {
                users.push(UserId::new(base));
            }
        }
        users
    }
}

impl fmt::Debug for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyName({})", self.name)
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl TryFrom<String> for KeyName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<KeyName> for String {
    fn from(name: KeyName) -> Self {
        name.name
    }
}

impl AsRef<str> for KeyName {
    fn as_ref(&self) -> &str {
        &self.name
    }
}
