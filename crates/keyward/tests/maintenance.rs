//! Key and rule maintenance, and host enrollment.

use std::path::PathBuf;

use keyward::store::{KeyOutcome, RuleOutcome};
use keyward::{
    host_rule_pattern, DocumentStore, HostId, HostKeySource, KeyName, KeyOwner, Keyward,
    KeywardError, MemoryStore, Settings, StoreError, UserId,
};
use keyward_testkit::{recipient, sample_key_access, StaticDeriver, TestFixture};

fn keyward(store: MemoryStore) -> Keyward<MemoryStore> {
    Keyward::new(Settings::default(), store, Box::new(StaticDeriver::new()))
}

fn user(name: &str) -> KeyName {
    KeyName::user(&UserId::from(name), 0).unwrap()
}

#[test]
fn test_keys_set_list_delete() {
    let keyward = keyward(MemoryStore::with_text(sample_key_access()));

    assert_eq!(
        keyward.set_key(user("alice"), &recipient(1), false).unwrap(),
        KeyOutcome::Added
    );
    assert!(matches!(
        keyward.set_key(user("alice"), &recipient(2), false),
        Err(KeywardError::Store(StoreError::DuplicateKey(_)))
    ));
    assert!(matches!(
        keyward.set_key(user("alice"), &recipient(2), true).unwrap(),
        KeyOutcome::Replaced { .. }
    ));

    let users = keyward.list_keys(Some(KeyOwner::User)).unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].value(), recipient(2).as_str());
    assert_eq!(keyward.list_keys(Some(KeyOwner::Host)).unwrap().len(), 2);
    assert_eq!(keyward.list_keys(None).unwrap().len(), 3);

    keyward.delete_key(&user("alice")).unwrap();
    assert!(matches!(
        keyward.delete_key(&user("alice")),
        Err(KeywardError::Store(StoreError::UnknownKey(_)))
    ));
}

#[test]
fn test_failed_edit_is_not_saved() {
    let store = MemoryStore::with_text(sample_key_access());
    let keyward = keyward(store);
    let before = keyward.store().text().unwrap();

    let h1 = KeyName::host(&HostId::from("h1")).unwrap();
    assert!(matches!(
        keyward.delete_key(&h1),
        Err(KeywardError::Store(StoreError::KeyInUse { .. }))
    ));
    assert_eq!(keyward.store().saves().unwrap(), 0);
    assert_eq!(keyward.store().text().unwrap(), before);
}

#[test]
fn test_unchanged_edit_is_not_saved() {
    let keyward = keyward(MemoryStore::new());
    keyward.set_key(user("bob"), &recipient(3), false).unwrap();
    assert_eq!(keyward.store().saves().unwrap(), 1);

    assert_eq!(
        keyward.set_key(user("bob"), &recipient(3), true).unwrap(),
        KeyOutcome::Unchanged
    );
    assert_eq!(keyward.store().saves().unwrap(), 1);
}

#[test]
fn test_rules_set_list_delete() {
    let keyward = keyward(MemoryStore::with_text(sample_key_access()));
    keyward.set_key(user("alice"), &recipient(1), false).unwrap();
    let h1 = KeyName::host(&HostId::from("h1")).unwrap();

    assert_eq!(
        keyward
            .set_rule("^secrets/shared/.*$", &[user("alice"), h1.clone()], false)
            .unwrap(),
        RuleOutcome::Added
    );
    assert!(matches!(
        keyward.set_rule("^secrets/shared/.*$", &[h1.clone()], false),
        Err(KeywardError::Store(StoreError::DuplicateRule(_)))
    ));
    assert!(matches!(
        keyward.set_rule("^secrets/other$", &[user("nobody")], false),
        Err(KeywardError::Store(StoreError::UnknownKey(_)))
    ));

    let rules = keyward.list_rules().unwrap();
    let patterns: Vec<_> = rules.iter().map(|r| r.path_regex()).collect();
    assert_eq!(
        patterns,
        [
            r"^secrets/hosts/h1\.yaml$",
            r"^secrets/hosts/h2\.yaml$",
            "^secrets/shared/.*$"
        ]
    );
    assert_eq!(rules[2].keys(), [user("alice"), h1.clone()]);

    // Replacing keeps the rule where it was
    keyward
        .set_rule(r"^secrets/hosts/h1\.yaml$", &[h1.clone(), user("alice")], true)
        .unwrap();
    let rules = keyward.list_rules().unwrap();
    assert_eq!(rules[0].path_regex(), r"^secrets/hosts/h1\.yaml$");
    assert_eq!(rules[0].keys().len(), 2);

    keyward.delete_rule("^secrets/shared/.*$").unwrap();
    assert!(matches!(
        keyward.delete_rule("^secrets/shared/.*$"),
        Err(KeywardError::Store(StoreError::RuleNotFound(_)))
    ));
    assert_eq!(keyward.list_rules().unwrap().len(), 2);
}

#[test]
fn test_enroll_host_with_recipient() {
    let keyward = keyward(MemoryStore::new());
    let host = HostId::from("web-1");

    let report = keyward
        .enroll_host(&host, HostKeySource::Recipient(recipient(9)))
        .unwrap();
    assert_eq!(report.key.as_str(), "host_web-1");
    assert_eq!(report.path_regex, r"^secrets/hosts/web-1\.yaml$");
    assert!(report.identity_file.is_none());

    let document = keyward.store().load().unwrap();
    assert_eq!(document.get_rule(&report.path_regex).unwrap().keys(), [report.key.clone()]);
    assert_eq!(
        document.get_key(&report.key).unwrap().value(),
        recipient(9).as_str()
    );

    assert!(matches!(
        keyward.enroll_host(&host, HostKeySource::Recipient(recipient(10))),
        Err(KeywardError::Store(StoreError::DuplicateKey(_)))
    ));
}

#[test]
fn test_enroll_host_rejects_existing_rule() {
    let keyward = keyward(MemoryStore::new());
    keyward.set_key(user("alice"), &recipient(1), false).unwrap();
    let host = HostId::from("db");
    keyward
        .set_rule(&host_rule_pattern(&host), &[user("alice")], false)
        .unwrap();

    assert!(matches!(
        keyward.enroll_host(&host, HostKeySource::Recipient(recipient(2))),
        Err(KeywardError::Store(StoreError::DuplicateRule(_)))
    ));
    assert!(keyward
        .store()
        .load()
        .unwrap()
        .get_key(&KeyName::host(&host).unwrap())
        .is_none());
}

#[test]
fn test_enroll_host_with_generated_identity() {
    let fixture = TestFixture::sample();
    let keyward = Keyward::new(
        Settings::default(),
        fixture.store(),
        Box::new(StaticDeriver::new()),
    );
    let identity: PathBuf = fixture.root().join("h3.agekey");

    let report = keyward
        .enroll_host(&HostId::from("h3"), HostKeySource::Generate(identity.clone()))
        .unwrap();
    assert_eq!(report.identity_file.as_deref(), Some(identity.as_path()));

    let text = std::fs::read_to_string(&identity).unwrap();
    assert!(text.contains(report.recipient.as_str()));
    assert_eq!(fixture.host_rule_keys("h3"), ["host_h3"]);

    // A second enrollment must not touch the identity file
    let again = keyward.enroll_host(&HostId::from("h3"), HostKeySource::Generate(identity.clone()));
    assert!(again.is_err());
    assert_eq!(std::fs::read_to_string(&identity).unwrap(), text);
}

#[test]
fn test_existing_identity_file_blocks_enrollment() {
    let fixture = TestFixture::sample();
    let keyward = Keyward::new(
        Settings::default(),
        fixture.store(),
        Box::new(StaticDeriver::new()),
    );
    let identity = fixture.root().join("h4.agekey");
    std::fs::write(&identity, "keep me\n").unwrap();
    let before = fixture.key_access_text();

    assert!(matches!(
        keyward.enroll_host(&HostId::from("h4"), HostKeySource::Generate(identity.clone())),
        Err(KeywardError::IdentityFile { .. })
    ));
    assert_eq!(std::fs::read_to_string(&identity).unwrap(), "keep me\n");
    assert_eq!(fixture.key_access_text(), before);
}
