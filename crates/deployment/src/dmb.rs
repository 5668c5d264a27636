// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A claimed, on-disk deployable artifact.

use crate::claim::ClaimGuard;
use std::fmt;
use std::path::Path;
use vigil_core::CompileJob;

/// A compile job bound to a concrete, exclusively-claimed working directory.
///
/// Dropping the provider releases the claim; the directory is then fair
/// game for retention cleanup once no other claims remain.
pub struct Dmb {
    compile_job: CompileJob,
    _claim: ClaimGuard,
}

impl Dmb {
    pub(crate) fn new(compile_job: CompileJob, claim: ClaimGuard) -> Self {
        Self {
            compile_job,
            _claim: claim,
        }
    }

    pub fn compile_job(&self) -> &CompileJob {
        &self.compile_job
    }

    pub fn directory(&self) -> &Path {
        &self.compile_job.directory
    }
}

impl fmt::Debug for Dmb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dmb")
            .field("compile_job", &self.compile_job.id)
            .field("directory", &self.compile_job.directory)
            .finish()
    }
}
