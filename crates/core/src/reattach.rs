// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The durable unit of supervision state.
//!
//! `ReattachInformation` records everything the watchdog needs to reconnect
//! to an already-running game-server process after the supervisor itself
//! restarted: the process, its port, the secret used to talk to it, and any
//! in-flight reboot intent.
//!
//! Invariant: at most one live record exists per instance at any committed
//! point. Multiple rows found on load indicate a crash mid-transition; all
//! but the newest are orphans to be reconciled and deleted.

use crate::compile_job::CompileJobId;
use crate::id::AccessIdentifier;
use serde::{Deserialize, Serialize};

/// In-flight reboot intent for a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebootState {
    /// No intent armed; reboots from the child are handled in place.
    #[default]
    Normal,
    /// End the session cleanly at the next child-signaled reboot point.
    Graceful,
    /// Relaunch the session at the next child-signaled reboot point.
    Immediate,
}

/// Security level the process was launched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchSecurityLevel {
    Trusted,
    #[default]
    Safe,
    Ultrasafe,
}

/// Network visibility the process was launched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchVisibility {
    #[default]
    Public,
    Private,
    Invisible,
}

/// Everything needed to reattach supervision to a running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReattachInformation {
    /// Secret authenticating topic calls to the process.
    pub access_identifier: AccessIdentifier,
    /// The artifact the process is running.
    pub compile_job_id: CompileJobId,
    /// Port the process listens for topic calls on.
    pub port: u16,
    /// OS process identifier.
    pub process_id: u32,
    /// In-flight reboot intent, if any.
    pub reboot_state: RebootState,
    /// Security level the process was launched with.
    pub security_level: LaunchSecurityLevel,
    /// Visibility the process was launched with.
    pub visibility: LaunchVisibility,
}

#[cfg(test)]
#[path = "reattach_tests.rs"]
mod tests;
