//! Key-access reconciliation.
//!
//! Brings the key-access document in line with derived key material and the
//! access policy:
//!
//! 1. Every derived key is written with `replace`, so the document always
//!    carries the latest material.
//! 2. For every rule pattern, host keys already in its key group are kept as
//!    they are; user keys are recomputed from scratch by asking the policy.
//!    When several rules share a pattern only the first is reconciled, the
//!    same rule SOPS would pick; later duplicates are left untouched.
//! 3. The key group becomes the sorted union of both.
//!
//! A user key belongs to the user it was derived for. Keys in the document
//! that were not derived in this run are matched by name; when the name is
//! ambiguous (`user_bob_2`) every possible owner must be granted access.
//!
//! Running it twice with the same inputs changes nothing the second time.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use keyward_core::{Fingerprint, KeyName, UserId};
use keyward_policy::AccessPolicy;
use keyward_store::{KeyAccessDocument, KeyOutcome, RuleOutcome};

use crate::derive::DerivedKey;
use crate::error::Result;

/// Key group changes of one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleChange {
    pub path_regex: String,
    pub added: Vec<KeyName>,
    pub removed: Vec<KeyName>,
}

/// What a reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub keys_added: Vec<KeyName>,
    pub keys_replaced: Vec<KeyName>,
    pub keys_unchanged: Vec<KeyName>,
    /// Rules whose key group changed.
    pub rules_changed: Vec<RuleChange>,
    /// Number of rules visited.
    pub rules_checked: usize,
    #[serde(serialize_with = "fingerprint_hex")]
    pub before: Fingerprint,
    #[serde(serialize_with = "fingerprint_hex")]
    pub after: Fingerprint,
}

impl ReconcileReport {
    /// Whether the emitted document differs from the loaded one.
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

fn fingerprint_hex<S: Serializer>(fingerprint: &Fingerprint, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&fingerprint.to_hex())
}

/// Reconcile `document` in memory. Nothing is persisted here.
///
/// On error the document may be partially updated and must be discarded.
pub fn reconcile<P: AccessPolicy + ?Sized>(
    document: &mut KeyAccessDocument,
    derived: &[DerivedKey],
    policy: &P,
) -> Result<ReconcileReport> {
    let before = document.fingerprint();
    let mut keys_added = Vec::new();
    let mut keys_replaced = Vec::new();
    let mut keys_unchanged = Vec::new();

    let owners: BTreeMap<&KeyName, &UserId> = derived.iter().map(|k| (&k.name, &k.user)).collect();
    for key in derived {
        match document.set_key(key.name.clone(), &key.recipient, true)? {
            KeyOutcome::Added => keys_added.push(key.name.clone()),
            KeyOutcome::Replaced { .. } => keys_replaced.push(key.name.clone()),
            KeyOutcome::Unchanged => keys_unchanged.push(key.name.clone()),
        }
    }

    let patterns: Vec<String> = document
        .rules()
        .patterns()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut rules_changed = Vec::new();
    for pattern in &patterns {
        let Some(rule) = document.get_rule(pattern) else {
            continue;
        };

        let mut desired: Vec<KeyName> = rule.keys().iter().filter(|k| k.is_host()).cloned().collect();
        desired.extend(
            document
                .keys()
                .user_keys()
                .into_iter()
                .map(|entry| entry.name())
                .filter(|name| may_decrypt(name, &owners, policy, pattern))
                .cloned(),
        );
        desired.sort();
        desired.dedup();

        match document.set_rule(pattern, &desired, true)? {
            RuleOutcome::Replaced { added, removed } => {
                tracing::info!(rule = %pattern, ?added, ?removed, "Updated creation rule");
                rules_changed.push(RuleChange {
                    path_regex: pattern.clone(),
                    added,
                    removed,
                });
            }
            RuleOutcome::Unchanged | RuleOutcome::Added => {}
        }
    }

    let after = document.fingerprint();
    let report = ReconcileReport {
        keys_added,
        keys_replaced,
        keys_unchanged,
        rules_changed,
        rules_checked: patterns.len(),
        before,
        after,
    };

    tracing::info!(
        added = report.keys_added.len(),
        replaced = report.keys_replaced.len(),
        unchanged = report.keys_unchanged.len(),
        rules_changed = report.rules_changed.len(),
        changed = report.changed(),
        "Reconciled key-access document"
    );
    Ok(report)
}

fn may_decrypt<P: AccessPolicy + ?Sized>(
    name: &KeyName,
    owners: &BTreeMap<&KeyName, &UserId>,
    policy: &P,
    pattern: &str,
) -> bool {
    if let Some(owner) = owners.get(name) {
        return policy.can_decrypt(owner, pattern);
    }
    let candidates = name.possible_users();
    if candidates.len() > 1 {
        tracing::debug!(key = %name, ?candidates, "Key owner is ambiguous, all readings must have access");
    }
    !candidates.is_empty() && candidates.iter().all(|user| policy.can_decrypt(user, pattern))
}
