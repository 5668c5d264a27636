// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact factory: resolving compile jobs to claimed working directories.

use crate::claim::ClaimLedger;
use crate::dmb::Dmb;
use crate::DeploymentError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use vigil_core::{CompileJob, CompileJobId};

/// Adapter exposing ready deployments to the watchdog
#[async_trait]
pub trait DmbFactory: Send + Sync + 'static {
    /// Claim a working directory for a specific compile job.
    ///
    /// Returns `Ok(None)` when the artifact's backing files are missing,
    /// e.g. garbage-collected by retention policy.
    async fn from_compile_job(
        &self,
        id: &CompileJobId,
    ) -> Result<Option<Dmb>, DeploymentError>;

    /// Claim the newest ready artifact, if any.
    async fn claim_next(&self) -> Result<Option<Dmb>, DeploymentError>;

    /// The most recently deployed compile job, if any.
    fn latest_compile_job(&self) -> Option<CompileJob>;

    /// Receiver bumped every time a newer deployment becomes ready.
    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// On-disk registry of deployed compile jobs.
///
/// Persisted next to the artifact directories so a restarted supervisor can
/// still resolve the compile job named by a reattach record.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    jobs: Vec<CompileJob>,
}

const REGISTRY_FILE: &str = "deployments.json";

struct FactoryState {
    registry: Registry,
    deploy_count: u64,
}

/// Filesystem-backed artifact factory.
///
/// The (external) build pipeline hands finished artifacts over via
/// [`LocalDmbFactory::deploy`]; the watchdog claims them through the
/// [`DmbFactory`] trait.
pub struct LocalDmbFactory {
    root: PathBuf,
    inner: Mutex<FactoryState>,
    ledger: ClaimLedger,
    newer_tx: watch::Sender<u64>,
}

impl LocalDmbFactory {
    /// Open (or initialize) a factory rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Arc<Self>, DeploymentError> {
        let root = root.into();
        let registry_path = root.join(REGISTRY_FILE);

        let registry = match std::fs::read(&registry_path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                DeploymentError::CorruptRegistry {
                    path: registry_path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Registry::default(),
            Err(source) => return Err(DeploymentError::io(&registry_path, source)),
        };

        let deploy_count = registry.jobs.len() as u64;
        let (newer_tx, _) = watch::channel(deploy_count);

        Ok(Arc::new(Self {
            root,
            inner: Mutex::new(FactoryState {
                registry,
                deploy_count,
            }),
            ledger: ClaimLedger::new(),
            newer_tx,
        }))
    }

    /// Register a finished artifact and signal subscribers.
    pub fn deploy(&self, job: CompileJob) -> Result<(), DeploymentError> {
        let count = {
            let mut state = self.inner.lock();
            state.registry.jobs.retain(|j| j.id != job.id);
            state.registry.jobs.push(job.clone());
            state.deploy_count += 1;
            self.write_registry(&state.registry)?;
            state.deploy_count
        };
        tracing::info!(compile_job = %job.id, engine_version = %job.engine_version, "deployment ready");
        let _ = self.newer_tx.send(count);
        Ok(())
    }

    /// Claim accounting, for retention and for tests.
    pub fn ledger(&self) -> &ClaimLedger {
        &self.ledger
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_registry(&self, registry: &Registry) -> Result<(), DeploymentError> {
        let path = self.root.join(REGISTRY_FILE);
        let staged = self.root.join(format!("{REGISTRY_FILE}.tmp"));
        let bytes = serde_json::to_vec_pretty(registry).map_err(|source| {
            DeploymentError::CorruptRegistry {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&staged, bytes).map_err(|e| DeploymentError::io(&staged, e))?;
        std::fs::rename(&staged, &path).map_err(|e| DeploymentError::io(&path, e))
    }

    fn find(&self, id: &CompileJobId) -> Option<CompileJob> {
        self.inner
            .lock()
            .registry
            .jobs
            .iter()
            .find(|j| &j.id == id)
            .cloned()
    }

    async fn claim_if_present(&self, job: CompileJob) -> Result<Option<Dmb>, DeploymentError> {
        match tokio::fs::metadata(&job.directory).await {
            Ok(meta) if meta.is_dir() => {
                let claim = self.ledger.claim(&job.id);
                Ok(Some(Dmb::new(job, claim)))
            }
            Ok(_) | Err(_) => {
                tracing::warn!(
                    compile_job = %job.id,
                    directory = %job.directory.display(),
                    "artifact directory is missing"
                );
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl DmbFactory for LocalDmbFactory {
    async fn from_compile_job(
        &self,
        id: &CompileJobId,
    ) -> Result<Option<Dmb>, DeploymentError> {
        match self.find(id) {
            Some(job) => self.claim_if_present(job).await,
            None => Ok(None),
        }
    }

    async fn claim_next(&self) -> Result<Option<Dmb>, DeploymentError> {
        let newest = {
            let state = self.inner.lock();
            state.registry.jobs.last().cloned()
        };
        match newest {
            Some(job) => self.claim_if_present(job).await,
            None => Ok(None),
        }
    }

    fn latest_compile_job(&self) -> Option<CompileJob> {
        self.inner.lock().registry.jobs.last().cloned()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.newer_tx.subscribe()
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
