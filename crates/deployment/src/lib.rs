// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vigil-deployment: deployable artifacts and how the watchdog claims them.
//!
//! A [`Dmb`] is an exclusive claim on one compile job's working directory;
//! directories with zero claims become eligible for artifact-retention
//! cleanup. A [`Swappable`] additionally owns a live filesystem link whose
//! target can be atomically repointed at a different artifact, which is what
//! makes zero-downtime deployment swaps possible.

pub mod claim;
pub mod dmb;
pub mod factory;
pub mod swappable;

use std::path::PathBuf;
use thiserror::Error;

pub use claim::{ClaimGuard, ClaimLedger};
pub use dmb::Dmb;
pub use factory::{DmbFactory, LocalDmbFactory};
pub use swappable::Swappable;

/// Errors from deployment operations
#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt deployment registry at {path}: {source}")]
    CorruptRegistry {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl DeploymentError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
