// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitor loop control tokens and state.

use serde::{Deserialize, Serialize};

/// Output of one decision step in the monitor loop.
///
/// A control token, never persisted. Produced by deploy strategies and
/// consumed by the loop to decide the next transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    /// Keep running, nothing to do.
    Continue,
    /// Tear down and relaunch the supervised process.
    Restart,
    /// Stop supervision.
    Exit,
    /// A deployment swap is staged; apply it at the next reboot point.
    DeferUpdate,
}

/// State machine over one logical supervision session.
///
/// Initial state is `NoSession`; `Stopped` is terminal but can always
/// transition back to `Starting` on an explicit start command. Published to
/// observers over a watch channel, hence the serde derives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchdogState {
    /// No process is supervised and none is being started.
    #[default]
    NoSession,
    /// A launch or reattach attempt is in progress.
    Starting,
    /// A process is supervised and healthy.
    Running,
    /// A graceful reboot intent is armed; waiting on the child's reboot.
    AwaitingReboot,
    /// A seamless deployment swap is staged for the next reboot point.
    SwappingDeployment,
    /// Supervision ended.
    Stopped,
}

impl WatchdogState {
    /// Whether a session is currently live (a child process is attached).
    pub fn has_session(self) -> bool {
        matches!(
            self,
            WatchdogState::Running
                | WatchdogState::AwaitingReboot
                | WatchdogState::SwappingDeployment
        )
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
