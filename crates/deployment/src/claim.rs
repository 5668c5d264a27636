// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claim accounting for artifact working directories.
//!
//! Every live [`crate::Dmb`] holds one [`ClaimGuard`]; the ledger's counts
//! drive artifact retention (an external collaborator deletes directories
//! whose count has reached zero).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use vigil_core::CompileJobId;

/// Shared per-compile-job claim counts.
#[derive(Clone, Default)]
pub struct ClaimLedger {
    counts: Arc<Mutex<HashMap<CompileJobId, usize>>>,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire one claim on `id`.
    pub fn claim(&self, id: &CompileJobId) -> ClaimGuard {
        let mut counts = self.counts.lock();
        *counts.entry(id.clone()).or_insert(0) += 1;
        ClaimGuard {
            id: id.clone(),
            counts: Arc::clone(&self.counts),
        }
    }

    /// Current number of claims on `id`.
    pub fn count(&self, id: &CompileJobId) -> usize {
        self.counts.lock().get(id).copied().unwrap_or(0)
    }

    /// Total live claims across all compile jobs.
    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }
}

/// One claim on a compile job's working directory; released on drop.
pub struct ClaimGuard {
    id: CompileJobId,
    counts: Arc<Mutex<HashMap<CompileJobId, usize>>>,
}

impl ClaimGuard {
    pub fn compile_job_id(&self) -> &CompileJobId {
        &self.id
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
#[path = "claim_tests.rs"]
mod tests;
