// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The topic protocol: authenticated control calls into the game server.
//!
//! Requests and responses are single JSON lines over a short-lived TCP
//! connection to the process's topic port. Every request carries the
//! session's access identifier; the server drops unauthenticated calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use vigil_core::{AccessIdentifier, RebootState};

/// Errors from topic calls
#[derive(Debug, Error)]
pub enum TopicError {
    #[error("topic call to port {port} timed out after {timeout:?}")]
    Timeout { port: u16, timeout: Duration },

    #[error("topic call to port {port} failed: {source}")]
    Io {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed topic response: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Control command understood by the supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum TopicCommand {
    /// Health probe.
    Ping,
    /// Ask the server to wind down and exit cleanly.
    Shutdown,
    /// Inform the server of a changed reboot intent.
    SetRebootState { state: RebootState },
}

/// One topic call, as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRequest {
    pub access_identifier: AccessIdentifier,
    #[serde(flatten)]
    pub command: TopicCommand,
}

/// The server's reply to a topic call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Adapter for issuing topic calls to a supervised process
#[async_trait]
pub trait TopicClient: Send + Sync + 'static {
    /// Send `request` to the process listening on `port`, waiting at most
    /// `timeout` for the full round trip.
    async fn send(
        &self,
        port: u16,
        request: TopicRequest,
        timeout: Duration,
    ) -> Result<TopicResponse, TopicError>;
}

/// Topic client speaking JSON lines over loopback TCP.
#[derive(Debug, Default, Clone)]
pub struct TcpTopicClient;

impl TcpTopicClient {
    pub fn new() -> Self {
        Self
    }

    async fn round_trip(port: u16, request: &TopicRequest) -> Result<TopicResponse, TopicError> {
        let io = |source| TopicError::Io { port, source };

        let stream = TcpStream::connect(("127.0.0.1", port)).await.map_err(io)?;
        let (read_half, mut write_half) = stream.into_split();

        let mut line = serde_json::to_string(request).map_err(TopicError::Malformed)?;
        line.push('\n');
        write_half.write_all(line.as_bytes()).await.map_err(io)?;
        write_half.shutdown().await.map_err(io)?;

        let mut reply = String::new();
        BufReader::new(read_half)
            .read_line(&mut reply)
            .await
            .map_err(io)?;
        serde_json::from_str(reply.trim_end()).map_err(TopicError::Malformed)
    }
}

#[async_trait]
impl TopicClient for TcpTopicClient {
    async fn send(
        &self,
        port: u16,
        request: TopicRequest,
        timeout: Duration,
    ) -> Result<TopicResponse, TopicError> {
        tracing::debug!(port, command = ?request.command, "sending topic call");
        match tokio::time::timeout(timeout, Self::round_trip(port, &request)).await {
            Ok(result) => result,
            Err(_) => Err(TopicError::Timeout { port, timeout }),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{TopicClient, TopicError, TopicRequest, TopicResponse};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    /// A recorded topic call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct TopicCall {
        pub port: u16,
        pub request: TopicRequest,
    }

    #[derive(Default)]
    struct FakeTopicState {
        calls: Vec<TopicCall>,
        scripted: VecDeque<Result<TopicResponse, &'static str>>,
    }

    /// Fake topic client for testing.
    ///
    /// Replies `ok` by default; tests can script per-call responses or
    /// failures in FIFO order via [`FakeTopicClient::script_ok`] and
    /// [`FakeTopicClient::script_timeout`].
    #[derive(Clone, Default)]
    pub struct FakeTopicClient {
        inner: Arc<Mutex<FakeTopicState>>,
    }

    impl FakeTopicClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// All calls observed so far, in order.
        pub fn calls(&self) -> Vec<TopicCall> {
            self.inner.lock().calls.clone()
        }

        /// Queue a successful response for the next unscripted call.
        pub fn script_ok(&self, message: Option<&str>) {
            self.inner.lock().scripted.push_back(Ok(TopicResponse {
                ok: true,
                message: message.map(str::to_string),
            }));
        }

        /// Queue a timeout for the next unscripted call.
        pub fn script_timeout(&self) {
            self.inner.lock().scripted.push_back(Err("timeout"));
        }
    }

    #[async_trait]
    impl TopicClient for FakeTopicClient {
        async fn send(
            &self,
            port: u16,
            request: TopicRequest,
            timeout: Duration,
        ) -> Result<TopicResponse, TopicError> {
            let mut state = self.inner.lock();
            state.calls.push(TopicCall { port, request });
            match state.scripted.pop_front() {
                Some(Ok(response)) => Ok(response),
                Some(Err(_)) => Err(TopicError::Timeout { port, timeout }),
                None => Ok(TopicResponse {
                    ok: true,
                    message: None,
                }),
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeTopicClient, TopicCall};

#[cfg(test)]
#[path = "topic_tests.rs"]
mod tests;
