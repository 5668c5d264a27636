// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vigil-watchdog: the supervision engine.
//!
//! One [`Watchdog`] per managed instance runs a single monitor-loop task
//! that owns the child process's lifecycle: launch or reattach, crash
//! recovery, operator commands, and deployment swaps. Swap handling is
//! delegated to a [`DeployStrategy`] selected at construction; the seamless
//! strategy repoints a live filesystem link instead of restarting when the
//! incoming artifact is compatible.

pub mod bridge;
pub mod controller;
pub mod engine;
pub mod strategy;

use thiserror::Error;

pub use bridge::{RebootBridge, RebootListener, RebootNotice, TcpRebootBridge};
pub use controller::{ControllerEvent, SessionController};
pub use engine::{Watchdog, WatchdogCommand, WatchdogConfig, WatchdogHandle};
pub use strategy::{
    BasicStrategy, BeforeApplyHook, DeployStrategy, NoopBeforeApply, PreparedLaunch,
    SeamlessStrategy,
};

#[cfg(any(test, feature = "test-support"))]
pub use bridge::FakeRebootBridge;

/// Errors from the supervision engine
#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error(transparent)]
    Process(#[from] vigil_process::ProcessError),

    #[error(transparent)]
    Deployment(#[from] vigil_deployment::DeploymentError),

    #[error(transparent)]
    Session(#[from] vigil_session::SessionError),

    #[error("no deployment is available to launch")]
    NoDeployment,

    #[error("launch precondition violated: {0}")]
    LaunchPrecondition(&'static str),

    #[error("reboot bridge error: {0}")]
    Bridge(#[source] std::io::Error),
}
