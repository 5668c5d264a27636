// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    no_session = { WatchdogState::NoSession, false },
    starting = { WatchdogState::Starting, false },
    running = { WatchdogState::Running, true },
    awaiting_reboot = { WatchdogState::AwaitingReboot, true },
    swapping = { WatchdogState::SwappingDeployment, true },
    stopped = { WatchdogState::Stopped, false },
)]
fn has_session(state: WatchdogState, expected: bool) {
    assert_eq!(state.has_session(), expected);
}

#[test]
fn default_state_is_no_session() {
    assert_eq!(WatchdogState::default(), WatchdogState::NoSession);
}

#[test]
fn state_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&WatchdogState::SwappingDeployment).unwrap(),
        "\"swapping_deployment\""
    );
}
