//! The access rule set: the `creation_rules` list of the key-access document.
//!
//! A rule binds a path pattern to exactly one key group of age keys:
//!
//! ```yaml
//! - path_regex: secrets/hosts/h1\.yaml$
//!   key_groups:
//!     - age:
//!         - *host_h1
//! ```
//!
//! Rules are matched in order by sops, so declaration order is kept and the
//! first rule for a pattern wins on lookup. Fields other than `path_regex`
//! and `key_groups` are carried through untouched.

use keyward_core::KeyName;

use crate::error::{Result, StoreError};
use crate::keys::KeyDirectory;
use crate::yaml::{Node, Scalar};

const PATH_REGEX: &str = "path_regex";
const KEY_GROUPS: &str = "key_groups";
const AGE: &str = "age";

#[derive(Debug, Clone, PartialEq, Eq)]
enum RuleField {
    PathRegex,
    KeyGroups,
    Other(String, Node),
}

/// One creation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    path_regex: Scalar,
    keys: Vec<KeyName>,
    fields: Vec<RuleField>,
}

impl AccessRule {
    fn new(path_regex: &str, keys: Vec<KeyName>) -> Self {
        Self {
            path_regex: Scalar::string(path_regex),
            keys,
            fields: vec![RuleField::PathRegex, RuleField::KeyGroups],
        }
    }

    /// The path pattern.
    pub fn path_regex(&self) -> &str {
        &self.path_regex.value
    }

    /// Names of the keys in the rule's key group, in document order.
    pub fn keys(&self) -> &[KeyName] {
        &self.keys
    }

    /// Whether the key group holds `name`.
    pub fn contains(&self, name: &KeyName) -> bool {
        self.keys.contains(name)
    }

    /// A field other than `path_regex` and `key_groups`, e.g. `encrypted_regex`.
    pub fn extra(&self, field: &str) -> Option<&Node> {
        self.fields.iter().find_map(|f| match f {
            RuleField::Other(name, node) if name == field => Some(node),
            _ => None,
        })
    }

    fn from_node(index: usize, node: &Node, directory: &KeyDirectory) -> Result<Self> {
        let integrity = |message: String| StoreError::Integrity(message);

        let Node::Mapping { entries, .. } = node else {
            return Err(integrity(format!(
                "creation rule #{index} is a {}, expected a mapping",
                node.kind()
            )));
        };

        let mut path_regex = None;
        let mut groups = None;
        let mut fields = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match key.as_str() {
                PATH_REGEX => match value {
                    Node::Scalar(scalar) => {
                        path_regex = Some(scalar.clone());
                        fields.push(RuleField::PathRegex);
                    }
                    other => {
                        return Err(integrity(format!(
                            "path_regex of creation rule #{index} is a {}",
                            other.kind()
                        )))
                    }
                },
                KEY_GROUPS => {
                    groups = Some(value);
                    fields.push(RuleField::KeyGroups);
                }
                _ => fields.push(RuleField::Other(key.clone(), value.clone())),
            }
        }

        let path_regex = path_regex
            .ok_or_else(|| integrity(format!("creation rule #{index} has no path_regex")))?;
        let pattern = path_regex.value.as_str();
        let groups =
            groups.ok_or_else(|| integrity(format!("creation rule for {pattern} has no key_groups")))?;

        let group = match groups {
            Node::Sequence { items, .. } if items.len() == 1 => &items[0],
            Node::Sequence { items, .. } => {
                return Err(integrity(format!(
                    "creation rule for {pattern} has {} key groups, expected exactly one",
                    items.len()
                )))
            }
            other => {
                return Err(integrity(format!(
                    "key_groups of {pattern} is a {}, expected a sequence",
                    other.kind()
                )))
            }
        };

        let members = match group {
            Node::Mapping { entries, .. } if entries.len() == 1 && entries[0].0 == AGE => {
                &entries[0].1
            }
            _ => {
                return Err(integrity(format!(
                    "key group for {pattern} does not use age only"
                )))
            }
        };
        let Node::Sequence { items, .. } = members else {
            return Err(integrity(format!(
                "age key group for {pattern} is a {}, expected a sequence",
                members.kind()
            )));
        };

        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let Node::Alias(anchor) = item else {
                return Err(integrity(format!(
                    "age key group for {pattern} holds an inline {}, expected a reference to keys",
                    item.kind()
                )));
            };
            let name = KeyName::parse(anchor)
                .map_err(|_| integrity(format!("{pattern} references non-key anchor {anchor}")))?;
            if !directory.contains(&name) {
                return Err(StoreError::UnknownKey(name));
            }
            keys.push(name);
        }

        Ok(Self {
            path_regex,
            keys,
            fields,
        })
    }

    fn to_node(&self) -> Node {
        let entries = self
            .fields
            .iter()
            .map(|field| match field {
                RuleField::PathRegex => {
                    (PATH_REGEX.to_string(), Node::Scalar(self.path_regex.clone()))
                }
                RuleField::KeyGroups => {
                    let aliases = self
                        .keys
                        .iter()
                        .map(|name| Node::Alias(name.to_string()))
                        .collect();
                    let group = Node::mapping(vec![(AGE.to_string(), Node::sequence(aliases))]);
                    (KEY_GROUPS.to_string(), Node::sequence(vec![group]))
                }
                RuleField::Other(name, node) => (name.clone(), node.clone()),
            })
            .collect();
        Node::mapping(entries)
    }
}

/// Result of [`AccessRuleSet::set_rule`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// A new rule was appended.
    Added,
    /// An existing rule got a new key group at the same position.
    Replaced {
        added: Vec<KeyName>,
        removed: Vec<KeyName>,
    },
    /// The rule already held exactly these keys.
    Unchanged,
}

/// Ordered list of creation rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRuleSet {
    rules: Vec<AccessRule>,
}

impl AccessRuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All rules in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &AccessRule> {
        self.rules.iter()
    }

    /// Rules whose pattern satisfies `predicate`, in declaration order.
    pub fn list_rules(&self, predicate: impl Fn(&str) -> bool) -> Vec<&AccessRule> {
        self.rules
            .iter()
            .filter(|r| predicate(r.path_regex()))
            .collect()
    }

    /// The first rule for `path_regex`.
    pub fn get_rule(&self, path_regex: &str) -> Option<&AccessRule> {
        self.rules.iter().find(|r| r.path_regex() == path_regex)
    }

    /// Distinct patterns in declaration order.
    pub fn patterns(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            if !seen.contains(&rule.path_regex()) {
                seen.push(rule.path_regex());
            }
        }
        seen
    }

    /// The first rule whose key group holds `name`.
    pub fn rule_using(&self, name: &KeyName) -> Option<&AccessRule> {
        self.rules.iter().find(|r| r.contains(name))
    }

    /// Create a rule, or with `replace` overwrite the key group of the first
    /// rule for `path_regex` in place.
    ///
    /// Every key must exist in `directory`. Duplicate names are dropped, the
    /// first occurrence deciding the position.
    pub fn set_rule(
        &mut self,
        directory: &KeyDirectory,
        path_regex: &str,
        key_names: &[KeyName],
        replace: bool,
    ) -> Result<RuleOutcome> {
        let mut keys: Vec<KeyName> = Vec::with_capacity(key_names.len());
        for name in key_names {
            if !directory.contains(name) {
                return Err(StoreError::UnknownKey(name.clone()));
            }
            if !keys.contains(name) {
                keys.push(name.clone());
            }
        }

        let Some(rule) = self.rules.iter_mut().find(|r| r.path_regex() == path_regex) else {
            tracing::debug!(rule = %path_regex, keys = keys.len(), "Adding creation rule");
            self.rules.push(AccessRule::new(path_regex, keys));
            return Ok(RuleOutcome::Added);
        };

        if !replace {
            return Err(StoreError::DuplicateRule(path_regex.to_string()));
        }
        if rule.keys == keys {
            return Ok(RuleOutcome::Unchanged);
        }

        let added = keys.iter().filter(|k| !rule.keys.contains(k)).cloned().collect();
        let removed = rule.keys.iter().filter(|k| !keys.contains(k)).cloned().collect();
        tracing::debug!(rule = %path_regex, ?added, ?removed, "Replacing creation rule keys");
        rule.keys = keys;
        Ok(RuleOutcome::Replaced { added, removed })
    }

    /// Remove the first rule for `path_regex`.
    pub fn delete_rule(&mut self, path_regex: &str) -> Result<AccessRule> {
        let index = self
            .rules
            .iter()
            .position(|r| r.path_regex() == path_regex)
            .ok_or_else(|| StoreError::RuleNotFound(path_regex.to_string()))?;
        tracing::debug!(rule = %path_regex, "Deleting creation rule");
        Ok(self.rules.remove(index))
    }

    pub(crate) fn from_node(node: &Node, directory: &KeyDirectory) -> Result<Self> {
        let items = match node {
            Node::Sequence { items, .. } => items.as_slice(),
            Node::Scalar(s) if s.value.is_empty() || s.value == "~" || s.value == "null" => &[],
            other => {
                return Err(StoreError::Integrity(format!(
                    "creation_rules is a {}, expected a sequence",
                    other.kind()
                )))
            }
        };

        let rules = items
            .iter()
            .enumerate()
            .map(|(index, item)| AccessRule::from_node(index, item, directory))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub(crate) fn to_node(&self) -> Node {
        Node::sequence(self.rules.iter().map(AccessRule::to_node).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yaml;
    use keyward_core::AgeIdentity;

    fn directory(names: &[&str]) -> KeyDirectory {
        let mut keys = KeyDirectory::new();
        for (i, name) in names.iter().enumerate() {
            let recipient = AgeIdentity::from_bytes([i as u8 + 1; 32]).recipient().unwrap();
            keys.set_key(KeyName::parse(name).unwrap(), &recipient, false)
                .unwrap();
        }
        keys
    }

    fn names(list: &[&str]) -> Vec<KeyName> {
        list.iter().map(|n| KeyName::parse(n).unwrap()).collect()
    }

    #[test]
    fn test_set_rule_requires_known_keys() {
        let keys = directory(&["host_h1"]);
        let mut rules = AccessRuleSet::new();
        assert!(matches!(
            rules.set_rule(&keys, "a", &names(&["user_ghost"]), false),
            Err(StoreError::UnknownKey(_))
        ));
        assert!(rules.is_empty());
    }

    #[test]
    fn test_set_rule_create_then_replace_in_place() {
        let keys = directory(&["host_h1", "host_h2", "user_alice"]);
        let mut rules = AccessRuleSet::new();

        rules.set_rule(&keys, "first", &names(&["host_h1"]), false).unwrap();
        rules.set_rule(&keys, "second", &names(&["host_h2"]), false).unwrap();
        assert!(matches!(
            rules.set_rule(&keys, "first", &names(&["host_h2"]), false),
            Err(StoreError::DuplicateRule(_))
        ));

        let outcome = rules
            .set_rule(&keys, "first", &names(&["host_h1", "user_alice"]), true)
            .unwrap();
        assert_eq!(
            outcome,
            RuleOutcome::Replaced {
                added: names(&["user_alice"]),
                removed: vec![],
            }
        );
        assert_eq!(rules.patterns(), vec!["first", "second"]);
        assert_eq!(rules.get_rule("first").unwrap().keys(), names(&["host_h1", "user_alice"]));

        assert_eq!(
            rules
                .set_rule(&keys, "first", &names(&["host_h1", "user_alice"]), true)
                .unwrap(),
            RuleOutcome::Unchanged
        );
    }

    #[test]
    fn test_first_rule_wins_on_lookup() {
        let text = "keys:\n  - &host_a age1a\n  - &host_b age1b\ncreation_rules:\n  - path_regex: x\n    key_groups:\n      - age:\n          - *host_a\n  - path_regex: x\n    key_groups:\n      - age:\n          - *host_b\n";
        let root = yaml::parse(text).unwrap();
        let keys = KeyDirectory::from_node(root.get("keys").unwrap()).unwrap();
        let mut rules = AccessRuleSet::from_node(root.get("creation_rules").unwrap(), &keys).unwrap();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules.patterns(), vec!["x"]);
        assert_eq!(rules.get_rule("x").unwrap().keys(), names(&["host_a"]));

        rules.delete_rule("x").unwrap();
        assert_eq!(rules.get_rule("x").unwrap().keys(), names(&["host_b"]));
        rules.delete_rule("x").unwrap();
        assert!(matches!(rules.delete_rule("x"), Err(StoreError::RuleNotFound(_))));
    }

    #[test]
    fn test_malformed_rules_are_rejected() {
        let keys = directory(&["host_a"]);
        let cases = [
            "- path_regex: x\n",
            "- path_regex: x\n  key_groups: []\n",
            "- path_regex: x\n  key_groups:\n    - age: [*host_a]\n    - age: [*host_a]\n",
            "- path_regex: x\n  key_groups:\n    - pgp:\n        - ABC\n",
            "- path_regex: x\n  key_groups:\n    - age:\n        - age1inline\n",
            "- key_groups:\n    - age: []\n",
        ];
        for case in cases {
            let text = format!("a: &host_a age1a\nrules:\n{}", indent_block(case));
            let root = yaml::parse(&text).unwrap();
            let result = AccessRuleSet::from_node(root.get("rules").unwrap(), &keys);
            assert!(
                matches!(result, Err(StoreError::Integrity(_))),
                "accepted malformed rule: {case}"
            );
        }
    }

    #[test]
    fn test_unknown_key_reference_is_rejected() {
        let keys = directory(&["host_a"]);
        let text = "a: &host_b age1b\nrules:\n  - path_regex: x\n    key_groups:\n      - age:\n          - *host_b\n";
        let root = yaml::parse(text).unwrap();
        assert!(matches!(
            AccessRuleSet::from_node(root.get("rules").unwrap(), &keys),
            Err(StoreError::UnknownKey(_))
        ));
    }

    #[test]
    fn test_extra_fields_survive_replacement() {
        let text = "keys:\n  - &host_a age1a\n  - &host_b age1b\nrules:\n  - path_regex: x\n    encrypted_regex: ^data$\n    key_groups:\n      - age:\n          - *host_a\n";
        let root = yaml::parse(text).unwrap();
        let keys = KeyDirectory::from_node(root.get("keys").unwrap()).unwrap();
        let mut rules = AccessRuleSet::from_node(root.get("rules").unwrap(), &keys).unwrap();

        rules.set_rule(&keys, "x", &names(&["host_b"]), true).unwrap();
        let rule = rules.get_rule("x").unwrap();
        assert!(rule.extra("encrypted_regex").is_some());

        let emitted = yaml::emit(&rules.to_node());
        assert_eq!(
            emitted,
            "- path_regex: x\n  encrypted_regex: ^data$\n  key_groups:\n    - age:\n        - *host_b\n"
        );
    }

    fn indent_block(text: &str) -> String {
        text.lines().map(|l| format!("  {l}\n")).collect()
    }
}
