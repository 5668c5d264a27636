// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

crate::define_id! {
    /// Test-only ID type.
    pub struct TestId("tst-");
}

#[test]
fn generated_ids_carry_prefix_and_are_unique() {
    let a = TestId::new();
    let b = TestId::new();
    assert!(a.as_str().starts_with("tst-"));
    assert_ne!(a, b);
}

#[test]
fn id_suffix_strips_prefix() {
    let id = TestId::from_string("tst-abc123");
    assert_eq!(id.suffix(), "abc123");
}

#[test]
fn id_serde_is_transparent() {
    let id = TestId::from_string("tst-xyz");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"tst-xyz\"");
    let parsed: TestId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn access_identifier_debug_is_redacted() {
    let access = AccessIdentifier::generate();
    let debug = format!("{:?}", access);
    assert!(!debug.contains(access.as_str()));
    assert!(debug.contains("redacted"));
}

#[test]
fn access_identifier_roundtrips_through_serde() {
    let access = AccessIdentifier::from_string("secret-token");
    let json = serde_json::to_string(&access).unwrap();
    let parsed: AccessIdentifier = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, access);
}

#[test]
fn generated_access_identifiers_are_unique() {
    assert_ne!(AccessIdentifier::generate(), AccessIdentifier::generate());
}
