// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable storage for reattach records and live instance settings.

use crate::SessionError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use vigil_core::{InstanceId, ReattachInformation};

/// One stored reattach record.
///
/// `row_id` is monotonically increasing per store; the largest row for an
/// instance is the newest (and only authoritative) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReattachRow {
    pub row_id: u64,
    pub instance_id: InstanceId,
    pub info: ReattachInformation,
}

/// Adapter for transactional reattach-record storage
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Durably insert a record for `instance`.
    async fn insert(
        &self,
        instance: &InstanceId,
        info: ReattachInformation,
    ) -> Result<(), SessionError>;

    /// All records for `instance`, oldest first.
    async fn rows(&self, instance: &InstanceId) -> Result<Vec<ReattachRow>, SessionError>;

    /// Delete a single record.
    async fn delete_row(&self, row_id: u64) -> Result<(), SessionError>;

    /// Delete all records for `instance`. Idempotent.
    async fn clear(&self, instance: &InstanceId) -> Result<(), SessionError>;

    /// The instance's current topic-call timeout, from live settings.
    async fn topic_timeout_ms(&self, instance: &InstanceId)
        -> Result<Option<u64>, SessionError>;

    /// Update the instance's topic-call timeout.
    async fn set_topic_timeout_ms(
        &self,
        instance: &InstanceId,
        timeout_ms: u64,
    ) -> Result<(), SessionError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct InstanceSettings {
    topic_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    next_row_id: u64,
    rows: Vec<ReattachRow>,
    settings: HashMap<InstanceId, InstanceSettings>,
}

/// JSON-file-backed session store.
///
/// Every mutation is written through to disk with a staged-file rename, so
/// a supervisor crash never leaves a torn store behind.
pub struct JsonSessionStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl JsonSessionStore {
    /// Open (or initialize) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                SessionError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(source) => return Err(SessionError::io(&path, source)),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    fn persist(&self, state: &StoreState) -> Result<(), SessionError> {
        let staged = {
            let mut name = self.path.as_os_str().to_os_string();
            name.push(".tmp");
            PathBuf::from(name)
        };
        let bytes = serde_json::to_vec_pretty(state).map_err(|source| SessionError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&staged, bytes).map_err(|e| SessionError::io(&staged, e))?;
        std::fs::rename(&staged, &self.path).map_err(|e| SessionError::io(&self.path, e))
    }
}

#[async_trait]
impl SessionStore for JsonSessionStore {
    async fn insert(
        &self,
        instance: &InstanceId,
        info: ReattachInformation,
    ) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        let row_id = state.next_row_id;
        state.next_row_id += 1;
        state.rows.push(ReattachRow {
            row_id,
            instance_id: instance.clone(),
            info,
        });
        self.persist(&state)
    }

    async fn rows(&self, instance: &InstanceId) -> Result<Vec<ReattachRow>, SessionError> {
        let state = self.state.lock();
        Ok(state
            .rows
            .iter()
            .filter(|r| &r.instance_id == instance)
            .cloned()
            .collect())
    }

    async fn delete_row(&self, row_id: u64) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.rows.retain(|r| r.row_id != row_id);
        self.persist(&state)
    }

    async fn clear(&self, instance: &InstanceId) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state.rows.retain(|r| &r.instance_id != instance);
        self.persist(&state)
    }

    async fn topic_timeout_ms(
        &self,
        instance: &InstanceId,
    ) -> Result<Option<u64>, SessionError> {
        let state = self.state.lock();
        Ok(state
            .settings
            .get(instance)
            .and_then(|s| s.topic_timeout_ms)
            .filter(|ms| *ms > 0))
    }

    async fn set_topic_timeout_ms(
        &self,
        instance: &InstanceId,
        timeout_ms: u64,
    ) -> Result<(), SessionError> {
        let mut state = self.state.lock();
        state
            .settings
            .entry(instance.clone())
            .or_default()
            .topic_timeout_ms = Some(timeout_ms);
        self.persist(&state)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
