// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound reboot notifications from the supervised process.
//!
//! When the in-game logic requests a reboot, the child calls back to the
//! supervisor rather than the other way around. The bridge listens for
//! those calls, authenticates them against the session's access identifier,
//! and surfaces them as [`RebootNotice`] values to the monitor loop.

use crate::WatchdogError;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use vigil_core::AccessIdentifier;

/// The child process reached a reboot point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootNotice;

/// Adapter for receiving reboot notifications from the child process
#[async_trait]
pub trait RebootBridge: Send + Sync + 'static {
    /// Start listening on `port` for notices authenticated by `access`.
    /// Port zero binds an ephemeral port; the bound port is reported by the
    /// returned listener.
    async fn open(
        &self,
        port: u16,
        access: &AccessIdentifier,
    ) -> Result<RebootListener, WatchdogError>;
}

/// Receiving end of an open bridge. Dropping it stops the listener.
pub struct RebootListener {
    port: u16,
    notices: mpsc::Receiver<RebootNotice>,
    shutdown: CancellationToken,
}

impl RebootListener {
    pub(crate) fn new(
        port: u16,
        notices: mpsc::Receiver<RebootNotice>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            port,
            notices,
            shutdown,
        }
    }

    /// Port the bridge is bound to, for handing to the child at launch.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The next authenticated notice. `None` once the bridge has closed.
    pub async fn recv(&mut self) -> Option<RebootNotice> {
        self.notices.recv().await
    }
}

impl Drop for RebootListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug, Deserialize)]
struct NoticeWire {
    access_identifier: AccessIdentifier,
}

/// Bridge listening for JSON-line notices over loopback TCP.
#[derive(Debug, Default, Clone)]
pub struct TcpRebootBridge;

impl TcpRebootBridge {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RebootBridge for TcpRebootBridge {
    async fn open(
        &self,
        port: u16,
        access: &AccessIdentifier,
    ) -> Result<RebootListener, WatchdogError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(WatchdogError::Bridge)?;
        let port = listener
            .local_addr()
            .map_err(WatchdogError::Bridge)?
            .port();

        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        tokio::spawn(serve(listener, access.clone(), tx, shutdown.clone()));

        tracing::debug!(port, "reboot bridge listening");
        Ok(RebootListener::new(port, rx, shutdown))
    }
}

async fn serve(
    listener: TcpListener,
    access: AccessIdentifier,
    notices: mpsc::Sender<RebootNotice>,
    shutdown: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer) = match accepted {
            Ok(conn) => conn,
            Err(error) => {
                tracing::warn!(%error, "reboot bridge accept failed");
                continue;
            }
        };

        // A client that connects and never writes must not hold up notices
        // from later connections.
        tokio::spawn(handle_notice(
            stream,
            peer,
            access.clone(),
            notices.clone(),
            shutdown.clone(),
        ));
    }
}

async fn handle_notice(
    stream: tokio::net::TcpStream,
    peer: std::net::SocketAddr,
    access: AccessIdentifier,
    notices: mpsc::Sender<RebootNotice>,
    shutdown: CancellationToken,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut line = String::new();
    let mut reader = BufReader::new(read_half);
    let read = tokio::select! {
        _ = shutdown.cancelled() => return,
        read = reader.read_line(&mut line) => read,
    };
    if read.is_err() {
        return;
    }

    match serde_json::from_str::<NoticeWire>(line.trim_end()) {
        Ok(wire) if wire.access_identifier == access => {
            let _ = write_half.write_all(b"{\"ok\":true}\n").await;
            let _ = notices.send(RebootNotice).await;
        }
        Ok(_) => {
            tracing::warn!(%peer, "reboot notice with wrong access identifier");
            let _ = write_half.write_all(b"{\"ok\":false}\n").await;
        }
        Err(error) => {
            tracing::warn!(%peer, %error, "malformed reboot notice");
            let _ = write_half.write_all(b"{\"ok\":false}\n").await;
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{RebootBridge, RebootListener, RebootNotice};
    use crate::WatchdogError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use vigil_core::AccessIdentifier;

    #[derive(Default)]
    struct FakeBridgeState {
        opens: Vec<(u16, AccessIdentifier)>,
        senders: Vec<mpsc::Sender<RebootNotice>>,
    }

    /// Fake reboot bridge for testing.
    ///
    /// Never touches the network; tests inject notices into the most
    /// recently opened listener via [`FakeRebootBridge::signal_reboot`].
    #[derive(Clone, Default)]
    pub struct FakeRebootBridge {
        inner: Arc<Mutex<FakeBridgeState>>,
    }

    impl FakeRebootBridge {
        pub fn new() -> Self {
            Self::default()
        }

        /// All `(port, access)` pairs the bridge was opened with.
        pub fn opens(&self) -> Vec<(u16, AccessIdentifier)> {
            self.inner.lock().opens.clone()
        }

        /// Deliver a notice to the most recently opened listener.
        pub async fn signal_reboot(&self) {
            let sender = self.inner.lock().senders.last().cloned();
            if let Some(tx) = sender {
                let _ = tx.send(RebootNotice).await;
            }
        }
    }

    #[async_trait]
    impl RebootBridge for FakeRebootBridge {
        async fn open(
            &self,
            port: u16,
            access: &AccessIdentifier,
        ) -> Result<RebootListener, WatchdogError> {
            let (tx, rx) = mpsc::channel(8);
            let bound = {
                let mut state = self.inner.lock();
                state.opens.push((port, access.clone()));
                state.senders.push(tx);
                // Ephemeral-port requests get a stable fake allocation.
                if port == 0 {
                    9200 + state.opens.len() as u16
                } else {
                    port
                }
            };
            Ok(RebootListener::new(bound, rx, CancellationToken::new()))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRebootBridge;

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
