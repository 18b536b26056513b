//! The key directory: the `keys` list of the key-access document.
//!
//! Every entry is an anchored scalar whose anchor is the key name and whose
//! value is the age recipient. Entries are identified by name; rules refer to
//! them by alias, so an entry that is not touched keeps its position and its
//! exact scalar presentation across a load/save cycle.

use keyward_core::{AgeRecipient, KeyName, KeyOwner};

use crate::error::{Result, StoreError};
use crate::yaml::{Node, Scalar};

/// A named public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    name: KeyName,
    value: Scalar,
}

impl KeyEntry {
    /// Create an entry for an age recipient.
    pub fn new(name: KeyName, recipient: &AgeRecipient) -> Self {
        let value = Scalar::string(recipient.as_str()).anchored(name.as_str());
        Self { name, value }
    }

    /// The key name.
    pub fn name(&self) -> &KeyName {
        &self.name
    }

    /// The key material as written in the document.
    pub fn value(&self) -> &str {
        &self.value.value
    }

    fn from_node(index: usize, node: &Node) -> Result<Self> {
        let Node::Scalar(scalar) = node else {
            return Err(StoreError::Integrity(format!(
                "key #{index} is a {}, expected an anchored scalar",
                node.kind()
            )));
        };
        let Some(anchor) = &scalar.anchor else {
            return Err(StoreError::Integrity(format!(
                "key #{index} ({}) has no anchor",
                scalar.value
            )));
        };
        let name = KeyName::parse(anchor).map_err(|e| StoreError::Integrity(e.to_string()))?;
        Ok(Self {
            name,
            value: scalar.clone(),
        })
    }

    fn to_node(&self) -> Node {
        Node::Scalar(self.value.clone())
    }
}

/// Result of [`KeyDirectory::set_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// A new entry was appended.
    Added,
    /// An existing entry got new key material at the same position.
    Replaced { previous: String },
    /// The entry already held this key material and was left untouched.
    Unchanged,
}

/// Ordered, name-addressed collection of public keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyDirectory {
    entries: Vec<KeyEntry>,
}

impl KeyDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in document order.
    pub fn iter(&self) -> impl Iterator<Item = &KeyEntry> {
        self.entries.iter()
    }

    /// Entries whose name satisfies `predicate`, in document order.
    pub fn list_keys(&self, predicate: impl Fn(&KeyName) -> bool) -> Vec<&KeyEntry> {
        self.entries.iter().filter(|e| predicate(&e.name)).collect()
    }

    /// Policy-managed keys (`user_` prefix).
    pub fn user_keys(&self) -> Vec<&KeyEntry> {
        self.list_keys(|name| name.owner() == KeyOwner::User)
    }

    /// System-managed keys (`host_` prefix).
    pub fn host_keys(&self) -> Vec<&KeyEntry> {
        self.list_keys(|name| name.owner() == KeyOwner::Host)
    }

    /// Look up a key by name.
    pub fn get_key(&self, name: &KeyName) -> Option<&KeyEntry> {
        self.entries.iter().find(|e| &e.name == name)
    }

    /// Whether a key with this name exists.
    pub fn contains(&self, name: &KeyName) -> bool {
        self.get_key(name).is_some()
    }

    /// Add a key, or with `replace` overwrite an existing one in place.
    ///
    /// Only names are checked for collisions; two names may hold the same
    /// key material.
    pub fn set_key(
        &mut self,
        name: KeyName,
        recipient: &AgeRecipient,
        replace: bool,
    ) -> Result<KeyOutcome> {
        let Some(index) = self.entries.iter().position(|e| e.name == name) else {
            tracing::debug!(key = %name, "Adding key");
            self.entries.push(KeyEntry::new(name, recipient));
            return Ok(KeyOutcome::Added);
        };

        if !replace {
            return Err(StoreError::DuplicateKey(name));
        }
        if self.entries[index].value() == recipient.as_str() {
            return Ok(KeyOutcome::Unchanged);
        }

        tracing::debug!(key = %name, "Replacing key");
        let previous = std::mem::replace(&mut self.entries[index], KeyEntry::new(name, recipient));
        Ok(KeyOutcome::Replaced {
            previous: previous.value.value,
        })
    }

    /// Remove a key.
    pub fn delete_key(&mut self, name: &KeyName) -> Result<KeyEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| &e.name == name)
            .ok_or_else(|| StoreError::UnknownKey(name.clone()))?;
        tracing::debug!(key = %name, "Deleting key");
        Ok(self.entries.remove(index))
    }

    pub(crate) fn from_node(node: &Node) -> Result<Self> {
        let items = match node {
            Node::Sequence { items, .. } => items.as_slice(),
            Node::Scalar(s) if s.value.is_empty() || s.value == "~" || s.value == "null" => &[],
            other => {
                return Err(StoreError::Integrity(format!(
                    "keys is a {}, expected a sequence",
                    other.kind()
                )))
            }
        };

        let mut directory = Self::new();
        for (index, item) in items.iter().enumerate() {
            let entry = KeyEntry::from_node(index, item)?;
            if directory.contains(&entry.name) {
                return Err(StoreError::Integrity(format!(
                    "key {} is listed more than once",
                    entry.name
                )));
            }
            directory.entries.push(entry);
        }
        Ok(directory)
    }

    pub(crate) fn to_node(&self) -> Node {
        Node::sequence(self.entries.iter().map(KeyEntry::to_node).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::{AgeIdentity, HostId, UserId};

    fn recipient(seed: u8) -> AgeRecipient {
        AgeIdentity::from_bytes([seed; 32]).recipient().unwrap()
    }

    fn user(name: &str) -> KeyName {
        KeyName::user(&UserId::from(name), 0).unwrap()
    }

    #[test]
    fn test_set_key_rejects_duplicates_without_replace() {
        let mut keys = KeyDirectory::new();
        assert_eq!(
            keys.set_key(user("alice"), &recipient(1), false).unwrap(),
            KeyOutcome::Added
        );
        assert!(matches!(
            keys.set_key(user("alice"), &recipient(1), false),
            Err(StoreError::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut keys = KeyDirectory::new();
        keys.set_key(user("alice"), &recipient(1), false).unwrap();
        keys.set_key(KeyName::host(&HostId::from("h1")).unwrap(), &recipient(2), false)
            .unwrap();

        let outcome = keys.set_key(user("alice"), &recipient(3), true).unwrap();
        assert_eq!(
            outcome,
            KeyOutcome::Replaced {
                previous: recipient(1).to_string()
            }
        );
        let names: Vec<_> = keys.iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["user_alice", "host_h1"]);
        assert_eq!(
            keys.get_key(&user("alice")).unwrap().value(),
            recipient(3).as_str()
        );
    }

    #[test]
    fn test_replace_with_same_material_is_unchanged() {
        let mut keys = KeyDirectory::new();
        keys.set_key(user("alice"), &recipient(1), false).unwrap();
        let before = keys.clone();

        assert_eq!(
            keys.set_key(user("alice"), &recipient(1), true).unwrap(),
            KeyOutcome::Unchanged
        );
        assert_eq!(keys, before);
    }

    #[test]
    fn test_same_material_under_two_names() {
        let mut keys = KeyDirectory::new();
        keys.set_key(user("alice"), &recipient(1), false).unwrap();
        keys.set_key(user("bob"), &recipient(1), false).unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_owner_partition_and_delete() {
        let mut keys = KeyDirectory::new();
        keys.set_key(user("alice"), &recipient(1), false).unwrap();
        keys.set_key(KeyName::host(&HostId::from("h1")).unwrap(), &recipient(2), false)
            .unwrap();

        assert_eq!(keys.user_keys().len(), 1);
        assert_eq!(keys.host_keys().len(), 1);

        keys.delete_key(&user("alice")).unwrap();
        assert!(matches!(
            keys.delete_key(&user("alice")),
            Err(StoreError::UnknownKey(_))
        ));
        assert!(keys.user_keys().is_empty());
    }

    #[test]
    fn test_from_node_validates_entries() {
        let unanchored = Node::sequence(vec![Node::Scalar(Scalar::string("age1x"))]);
        assert!(matches!(
            KeyDirectory::from_node(&unanchored),
            Err(StoreError::Integrity(_))
        ));

        let foreign = Node::sequence(vec![Node::Scalar(
            Scalar::string("age1x").anchored("admin_bob"),
        )]);
        assert!(matches!(
            KeyDirectory::from_node(&foreign),
            Err(StoreError::Integrity(_))
        ));

        let twice = Node::sequence(vec![
            Node::Scalar(Scalar::string("age1x").anchored("user_a")),
            Node::Scalar(Scalar::string("age1y").anchored("user_a")),
        ]);
        assert!(matches!(
            KeyDirectory::from_node(&twice),
            Err(StoreError::Integrity(_))
        ));
    }
}
