// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reattach-record lifecycle: save, load-and-reconcile, clear.

use crate::store::SessionStore;
use crate::SessionError;
use std::sync::Arc;
use std::time::Duration;
use vigil_core::{InstanceId, ReattachInformation};
use vigil_deployment::{Dmb, DmbFactory};
use vigil_process::ProcessExecutor;

/// A reconstructed session, ready for the watchdog to reattach to.
#[derive(Debug)]
pub struct ReattachedSession {
    pub info: ReattachInformation,
    /// Claimed artifact the process is running from.
    pub dmb: Dmb,
    /// Topic-call timeout from the instance's live settings.
    pub topic_timeout: Duration,
}

/// Persists and reconstructs the one live reattach record per instance.
///
/// `save` is called at every commit point in the session lifecycle (launch,
/// reboot-state change, deployment swap), `load` once at supervisor startup,
/// and `clear` whenever the session ends on purpose. Load reconciles any
/// leftovers from a crash mid-transition: older records are orphans whose
/// processes get killed.
pub struct SessionPersistor {
    instance: InstanceId,
    store: Arc<dyn SessionStore>,
    executor: Arc<dyn ProcessExecutor>,
    factory: Arc<dyn DmbFactory>,
}

impl SessionPersistor {
    pub fn new(
        instance: InstanceId,
        store: Arc<dyn SessionStore>,
        executor: Arc<dyn ProcessExecutor>,
        factory: Arc<dyn DmbFactory>,
    ) -> Self {
        Self {
            instance,
            store,
            executor,
            factory,
        }
    }

    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    /// The instance's current topic-call timeout, from live settings.
    pub async fn topic_timeout(&self) -> Result<Option<Duration>, SessionError> {
        Ok(self
            .store
            .topic_timeout_ms(&self.instance)
            .await?
            .map(Duration::from_millis))
    }

    /// Commit `info` as the instance's only live record.
    ///
    /// Clears first so a crash between the two writes leaves zero records
    /// (a clean "no session" state) rather than two conflicting ones.
    pub async fn save(&self, info: ReattachInformation) -> Result<(), SessionError> {
        tracing::debug!(
            instance = %self.instance,
            pid = info.process_id,
            compile_job = %info.compile_job_id,
            "saving reattach record"
        );
        self.store.clear(&self.instance).await?;
        self.store.insert(&self.instance, info).await
    }

    /// Drop the instance's reattach record. Idempotent.
    pub async fn clear(&self) -> Result<(), SessionError> {
        tracing::debug!(instance = %self.instance, "clearing reattach record");
        self.store.clear(&self.instance).await
    }

    /// Reconstruct the live session from storage, if one can be recovered.
    ///
    /// Returns `Ok(None)` when there is nothing to reattach to: no record,
    /// no usable topic timeout, or the recorded artifact no longer exists.
    /// Store failures are errors; a dead or unkillable orphan process is not.
    pub async fn load(&self) -> Result<Option<ReattachedSession>, SessionError> {
        let mut rows = self.store.rows(&self.instance).await?;
        let Some(newest_id) = rows.iter().map(|r| r.row_id).max() else {
            tracing::debug!(instance = %self.instance, "no reattach record");
            return Ok(None);
        };

        // Everything but the newest record is debris from a crash
        // mid-transition. Kill the processes and drop the rows.
        for orphan in rows.iter().filter(|r| r.row_id != newest_id) {
            self.reap_orphan(orphan.info.process_id).await;
            self.store.delete_row(orphan.row_id).await?;
        }

        let Some(pos) = rows.iter().position(|r| r.row_id == newest_id) else {
            return Ok(None);
        };
        let newest = rows.swap_remove(pos);

        let Some(timeout_ms) = self.store.topic_timeout_ms(&self.instance).await? else {
            tracing::error!(
                instance = %self.instance,
                "cannot reattach without a topic timeout; instance settings are incomplete"
            );
            return Ok(None);
        };

        let Some(dmb) = self
            .factory
            .from_compile_job(&newest.info.compile_job_id)
            .await?
        else {
            tracing::error!(
                instance = %self.instance,
                compile_job = %newest.info.compile_job_id,
                "recorded artifact no longer exists, dropping reattach record"
            );
            self.store.delete_row(newest.row_id).await?;
            return Ok(None);
        };

        tracing::info!(
            instance = %self.instance,
            pid = newest.info.process_id,
            compile_job = %newest.info.compile_job_id,
            "reattach record recovered"
        );
        Ok(Some(ReattachedSession {
            info: newest.info,
            dmb,
            topic_timeout: Duration::from_millis(timeout_ms),
        }))
    }

    /// Best-effort kill of an orphaned process. The record is deleted either
    /// way; a pid that cannot be killed now is already gone or beyond us.
    async fn reap_orphan(&self, pid: u32) {
        match self.executor.attach(pid).await {
            Ok(Some(handle)) => {
                tracing::warn!(instance = %self.instance, pid, "killing orphaned process");
                if let Err(error) = handle.terminate() {
                    tracing::warn!(instance = %self.instance, pid, %error, "failed to kill orphan");
                    return;
                }
                handle.wait().await;
            }
            Ok(None) => {
                tracing::debug!(instance = %self.instance, pid, "orphaned process already gone");
            }
            Err(error) => {
                tracing::warn!(instance = %self.instance, pid, %error, "failed to probe orphan");
            }
        }
    }
}

#[cfg(test)]
#[path = "persistor_tests.rs"]
mod tests;
