// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vigil-core: domain types for the vigil game-server watchdog

pub mod compile_job;
pub mod id;
pub mod instance;
pub mod monitor;
pub mod reattach;

pub use compile_job::{CompileJob, CompileJobId, DeployJobId};
pub use id::AccessIdentifier;
pub use instance::{Instance, InstanceId, LaunchSettings};
pub use monitor::{MonitorAction, WatchdogState};
pub use reattach::{LaunchSecurityLevel, LaunchVisibility, ReattachInformation, RebootState};
