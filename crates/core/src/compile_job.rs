// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compile job records.
//!
//! A compile job is one built, deployable unit of game content. Jobs are
//! produced by the (external) build pipeline and are read-only to the
//! watchdog: it claims them, runs them, and swaps between them, but never
//! mutates them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::define_id! {
    /// Unique identifier for a compile job (one built artifact).
    pub struct CompileJobId("cj-");
}

crate::define_id! {
    /// Identifier of the deployment job that produced a compile job.
    pub struct DeployJobId("dep-");
}

/// An immutable record describing one build artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileJob {
    /// Unique identifier of this artifact.
    pub id: CompileJobId,
    /// The deployment job that produced the artifact.
    pub deploy_job_id: DeployJobId,
    /// Target engine version the artifact was built against.
    pub engine_version: String,
    /// Artifact entry-point name (the file the engine is launched with).
    pub entry_point: String,
    /// Directory the artifact's files live in.
    pub directory: PathBuf,
}

impl CompileJob {
    /// Whether a running process built from `self` could have `other`
    /// swapped in underneath it without a relaunch.
    ///
    /// Different engine binaries or entry points cannot share a live
    /// process, so both must match exactly.
    pub fn swap_compatible(&self, other: &CompileJob) -> bool {
        self.engine_version == other.engine_version && self.entry_point == other.entry_point
    }
}

#[cfg(test)]
#[path = "compile_job_tests.rs"]
mod tests;
