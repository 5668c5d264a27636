// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! vigil-session: durable supervision state and the topic protocol.
//!
//! The [`SessionPersistor`] mirrors every decision about which process and
//! artifact are "live" into the [`SessionStore`], so a crashed supervisor
//! can reconstruct its in-memory state and reattach instead of killing a
//! perfectly healthy game server.

pub mod persistor;
pub mod store;
pub mod topic;

use std::path::PathBuf;
use thiserror::Error;

pub use persistor::{ReattachedSession, SessionPersistor};
pub use store::{JsonSessionStore, ReattachRow, SessionStore};
pub use topic::{TcpTopicClient, TopicClient, TopicCommand, TopicError, TopicRequest, TopicResponse};

#[cfg(any(test, feature = "test-support"))]
pub use topic::{FakeTopicClient, TopicCall};

/// Errors from session persistence operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt session store at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Deployment(#[from] vigil_deployment::DeploymentError),
}

impl SessionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
