// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vigil-process: launching, attaching to, and signalling external OS
//! processes.
//!
//! The watchdog never touches `tokio::process` or raw signals directly; it
//! goes through the [`ProcessExecutor`] adapter so supervision logic can be
//! tested against [`FakeProcessExecutor`] without spawning anything.

pub mod executor;
mod native;

pub use executor::{ExitStatus, LaunchSpec, ProcessError, ProcessExecutor, ProcessHandle};
pub use native::NativeProcessExecutor;

#[cfg(any(test, feature = "test-support"))]
pub use executor::{FakeProcessExecutor, FakeProcessHandle};
