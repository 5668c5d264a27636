// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn info() -> ReattachInformation {
    ReattachInformation {
        access_identifier: AccessIdentifier::from_string("secret"),
        compile_job_id: CompileJobId::from_string("cj-abc"),
        port: 9001,
        process_id: 4242,
        reboot_state: RebootState::Normal,
        security_level: LaunchSecurityLevel::Safe,
        visibility: LaunchVisibility::Public,
    }
}

#[test]
fn reattach_information_serde_roundtrip() {
    let original = info();
    let json = serde_json::to_string(&original).unwrap();
    let parsed: ReattachInformation = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, original);
}

#[test]
fn reboot_state_defaults_to_normal() {
    assert_eq!(RebootState::default(), RebootState::Normal);
}

#[test]
fn reboot_state_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&RebootState::Graceful).unwrap(),
        "\"graceful\""
    );
    assert_eq!(
        serde_json::to_string(&RebootState::Immediate).unwrap(),
        "\"immediate\""
    );
}

#[test]
fn launch_enums_default_values() {
    assert_eq!(LaunchSecurityLevel::default(), LaunchSecurityLevel::Safe);
    assert_eq!(LaunchVisibility::default(), LaunchVisibility::Public);
}
