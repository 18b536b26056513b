//! The key-access document (`.sops.yaml`).
//!
//! Holds the [`KeyDirectory`] and [`AccessRuleSet`] plus every other
//! top-level field, in document order. Cross-references between rules and
//! keys are kept by key name and re-emitted as YAML aliases, so the emitted
//! text only changes where an entry actually changed.

use keyward_core::{AgeRecipient, Fingerprint, KeyName};

use crate::error::{Result, StoreError};
use crate::keys::{KeyDirectory, KeyEntry, KeyOutcome};
use crate::rules::{AccessRule, AccessRuleSet, RuleOutcome};
use crate::yaml::{self, Node};

const KEYS: &str = "keys";
const CREATION_RULES: &str = "creation_rules";

#[derive(Debug, Clone, PartialEq, Eq)]
enum TopField {
    Keys,
    CreationRules,
    Other(String, Node),
}

/// In-memory key-access document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAccessDocument {
    keys: KeyDirectory,
    rules: AccessRuleSet,
    fields: Vec<TopField>,
}

impl Default for KeyAccessDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyAccessDocument {
    /// Create a document with no keys and no rules.
    pub fn new() -> Self {
        Self {
            keys: KeyDirectory::new(),
            rules: AccessRuleSet::new(),
            fields: vec![TopField::Keys, TopField::CreationRules],
        }
    }

    /// Parse a document. Empty text yields an empty document.
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_node(&yaml::parse(text)?)
    }

    /// Build a document from a parsed YAML tree, validating every rule.
    pub fn from_node(root: &Node) -> Result<Self> {
        let Node::Mapping { entries, .. } = root else {
            return Err(StoreError::Integrity(format!(
                "document root is a {}, expected a mapping",
                root.kind()
            )));
        };

        let mut fields = Vec::with_capacity(entries.len());
        let mut keys_node = None;
        let mut rules_node = None;
        for (key, value) in entries {
            match key.as_str() {
                KEYS => {
                    keys_node = Some(value);
                    fields.push(TopField::Keys);
                }
                CREATION_RULES => {
                    rules_node = Some(value);
                    fields.push(TopField::CreationRules);
                }
                _ => fields.push(TopField::Other(key.clone(), value.clone())),
            }
        }

        let keys = match keys_node {
            Some(node) => KeyDirectory::from_node(node)?,
            None => {
                fields.insert(0, TopField::Keys);
                KeyDirectory::new()
            }
        };
        let rules = match rules_node {
            Some(node) => AccessRuleSet::from_node(node, &keys)?,
            None => {
                let after_keys = fields
                    .iter()
                    .position(|f| *f == TopField::Keys)
                    .map_or(0, |i| i + 1);
                fields.insert(after_keys, TopField::CreationRules);
                AccessRuleSet::new()
            }
        };

        Ok(Self {
            keys,
            rules,
            fields,
        })
    }

    /// The document as a YAML tree.
    pub fn to_node(&self) -> Node {
        let entries = self
            .fields
            .iter()
            .map(|field| match field {
                TopField::Keys => (KEYS.to_string(), self.keys.to_node()),
                TopField::CreationRules => (CREATION_RULES.to_string(), self.rules.to_node()),
                TopField::Other(name, node) => (name.clone(), node.clone()),
            })
            .collect();
        Node::mapping(entries)
    }

    /// The document as YAML text.
    pub fn to_yaml(&self) -> String {
        yaml::emit(&self.to_node())
    }

    /// Fingerprint of the emitted text.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self.to_yaml().as_bytes())
    }

    /// The key directory.
    pub fn keys(&self) -> &KeyDirectory {
        &self.keys
    }

    /// The rule set.
    pub fn rules(&self) -> &AccessRuleSet {
        &self.rules
    }

    /// A top-level field other than `keys` and `creation_rules`.
    pub fn extra(&self, field: &str) -> Option<&Node> {
        self.fields.iter().find_map(|f| match f {
            TopField::Other(name, node) if name == field => Some(node),
            _ => None,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Keys whose name satisfies `predicate`.
    pub fn list_keys(&self, predicate: impl Fn(&KeyName) -> bool) -> Vec<&KeyEntry> {
        self.keys.list_keys(predicate)
    }

    /// Look up a key.
    pub fn get_key(&self, name: &KeyName) -> Option<&KeyEntry> {
        self.keys.get_key(name)
    }

    /// Add or replace a key. See [`KeyDirectory::set_key`].
    pub fn set_key(
        &mut self,
        name: KeyName,
        recipient: &AgeRecipient,
        replace: bool,
    ) -> Result<KeyOutcome> {
        self.keys.set_key(name, recipient, replace)
    }

    /// Remove a key that no rule references.
    pub fn delete_key(&mut self, name: &KeyName) -> Result<KeyEntry> {
        if let Some(rule) = self.rules.rule_using(name) {
            return Err(StoreError::KeyInUse {
                key: name.clone(),
                rule: rule.path_regex().to_string(),
            });
        }
        self.keys.delete_key(name)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rule Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Rules whose pattern satisfies `predicate`.
    pub fn list_rules(&self, predicate: impl Fn(&str) -> bool) -> Vec<&AccessRule> {
        self.rules.list_rules(predicate)
    }

    /// The first rule for `path_regex`.
    pub fn get_rule(&self, path_regex: &str) -> Option<&AccessRule> {
        self.rules.get_rule(path_regex)
    }

    /// Create or replace a rule. See [`AccessRuleSet::set_rule`].
    pub fn set_rule(
        &mut self,
        path_regex: &str,
        key_names: &[KeyName],
        replace: bool,
    ) -> Result<RuleOutcome> {
        self.rules.set_rule(&self.keys, path_regex, key_names, replace)
    }

    /// Remove the first rule for `path_regex`.
    pub fn delete_rule(&mut self, path_regex: &str) -> Result<AccessRule> {
        self.rules.delete_rule(path_regex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_core::{AgeIdentity, HostId, UserId};

    const SOPS: &str = r"keys:
  - &host_h1 age1qyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqs3290gq
  - &user_alice age1zvkyg2lqzraa2lnjvqej32nkuu0ues2s82hzrye869xeexvn73equnujwj
creation_rules:
  - path_regex: secrets/hosts/h1\.yaml$
    key_groups:
      - age:
          - *host_h1
stores:
  yaml:
    indent: 2
";

    fn recipient(seed: u8) -> AgeRecipient {
        AgeIdentity::from_bytes([seed; 32]).recipient().unwrap()
    }

    #[test]
    fn test_load_save_is_identity() {
        let doc = KeyAccessDocument::parse(SOPS).unwrap();
        assert_eq!(doc.keys().len(), 2);
        assert_eq!(doc.rules().len(), 1);
        assert!(doc.extra("stores").is_some());
        assert_eq!(doc.to_yaml(), SOPS);
    }

    #[test]
    fn test_empty_document() {
        let doc = KeyAccessDocument::parse("").unwrap();
        assert!(doc.keys().is_empty());
        assert!(doc.rules().is_empty());
        assert_eq!(doc.to_yaml(), "keys: []\ncreation_rules: []\n");
        assert_eq!(KeyAccessDocument::parse(&doc.to_yaml()).unwrap(), doc);
    }

    #[test]
    fn test_missing_sections_are_added_in_front() {
        let doc = KeyAccessDocument::parse("stores:\n  yaml:\n    indent: 2\n").unwrap();
        assert_eq!(
            doc.to_yaml(),
            "keys: []\ncreation_rules: []\nstores:\n  yaml:\n    indent: 2\n"
        );
    }

    #[test]
    fn test_untouched_entries_emit_identically() {
        let mut doc = KeyAccessDocument::parse(SOPS).unwrap();
        let alice = KeyName::user(&UserId::from("alice"), 0).unwrap();
        let h1 = KeyName::host(&HostId::from("h1")).unwrap();

        doc.set_rule(r"secrets/hosts/h1\.yaml$", &[h1, alice], true)
            .unwrap();
        let text = doc.to_yaml();

        assert!(text.starts_with(
            "keys:\n  - &host_h1 age1qyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqszqgpqyqs3290gq\n"
        ));
        assert!(text.contains("          - *host_h1\n          - *user_alice\n"));
        assert!(text.ends_with("stores:\n  yaml:\n    indent: 2\n"));
    }

    #[test]
    fn test_delete_key_in_use() {
        let mut doc = KeyAccessDocument::parse(SOPS).unwrap();
        let h1 = KeyName::host(&HostId::from("h1")).unwrap();
        assert!(matches!(
            doc.delete_key(&h1),
            Err(StoreError::KeyInUse { .. })
        ));

        doc.delete_rule(r"secrets/hosts/h1\.yaml$").unwrap();
        doc.delete_key(&h1).unwrap();
        assert!(doc.get_key(&h1).is_none());
    }

    #[test]
    fn test_fingerprint_tracks_changes() {
        let mut doc = KeyAccessDocument::new();
        let before = doc.fingerprint();

        let bob = KeyName::user(&UserId::from("bob"), 0).unwrap();
        doc.set_key(bob.clone(), &recipient(7), false).unwrap();
        assert_ne!(doc.fingerprint(), before);

        let after = doc.fingerprint();
        doc.set_key(bob, &recipient(7), true).unwrap();
        assert_eq!(doc.fingerprint(), after);
    }

    #[test]
    fn test_root_must_be_mapping() {
        assert!(matches!(
            KeyAccessDocument::parse("- a\n- b\n"),
            Err(StoreError::Integrity(_))
        ));
    }
}
