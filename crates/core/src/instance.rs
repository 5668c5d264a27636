// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-managed-instance configuration scope.
//!
//! Read-only input to the supervision core. Settings that may change while a
//! session is live (notably the topic-call timeout) are always re-read from
//! the settings store rather than from values captured here.

use crate::reattach::{LaunchSecurityLevel, LaunchVisibility};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a managed game-server instance.
    pub struct InstanceId("inst-");
}

/// One managed game-server instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    pub launch: LaunchSettings,
}

/// Launch parameters for the supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSettings {
    /// Port the child process listens for topic calls on.
    pub port: u16,
    /// Port the supervisor listens on for child reboot notifications.
    /// Zero binds an ephemeral port.
    pub bridge_port: u16,
    pub security_level: LaunchSecurityLevel,
    pub visibility: LaunchVisibility,
    /// Raise the child's scheduling priority after launch (best effort).
    pub high_priority: bool,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            port: 9100,
            bridge_port: 0,
            security_level: LaunchSecurityLevel::default(),
            visibility: LaunchVisibility::default(),
            high_priority: false,
        }
    }
}
