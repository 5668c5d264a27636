// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Artifact providers that can be swapped into a live link.

use crate::dmb::Dmb;
use crate::DeploymentError;
use std::fmt;
use std::path::{Path, PathBuf};
use vigil_core::CompileJob;

/// A [`Dmb`] that additionally owns a live filesystem link.
///
/// "Active" means the link currently resolves to this provider's directory.
/// The supervised process runs from the link path, so repointing the link
/// swaps the content it reads without touching the process.
pub struct Swappable {
    dmb: Dmb,
    live_link: PathBuf,
}

impl Swappable {
    pub fn new(dmb: Dmb, live_link: impl Into<PathBuf>) -> Self {
        Self {
            dmb,
            live_link: live_link.into(),
        }
    }

    pub fn compile_job(&self) -> &CompileJob {
        self.dmb.compile_job()
    }

    pub fn live_link(&self) -> &Path {
        &self.live_link
    }

    /// Ensure the live link targets this provider's directory.
    ///
    /// Idempotent and atomic: the replacement link is created under a staging
    /// name and renamed over the live path, so no observer ever sees a
    /// missing or half-written link. Cancelling mid-call leaves at worst a
    /// stale staging file, which the next call removes.
    pub async fn make_active(&self) -> Result<(), DeploymentError> {
        let target = self.dmb.directory();
        if self.is_active() {
            tracing::debug!(link = %self.live_link.display(), "live link already points here");
            return Ok(());
        }

        let staged = staging_path(&self.live_link);
        match tokio::fs::remove_file(&staged).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(DeploymentError::io(&staged, source)),
        }

        tokio::fs::symlink(target, &staged)
            .await
            .map_err(|e| DeploymentError::io(&staged, e))?;
        tokio::fs::rename(&staged, &self.live_link)
            .await
            .map_err(|e| DeploymentError::io(&self.live_link, e))?;

        tracing::info!(
            compile_job = %self.dmb.compile_job().id,
            link = %self.live_link.display(),
            target = %target.display(),
            "live link redirected"
        );
        Ok(())
    }

    /// Whether the live link currently resolves to this provider's directory.
    pub fn is_active(&self) -> bool {
        std::fs::read_link(&self.live_link)
            .map(|t| t == self.dmb.directory())
            .unwrap_or(false)
    }

    /// Release the link, keeping the underlying artifact claim.
    pub fn into_dmb(self) -> Dmb {
        self.dmb
    }
}

impl fmt::Debug for Swappable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Swappable")
            .field("compile_job", &self.dmb.compile_job().id)
            .field("live_link", &self.live_link)
            .finish()
    }
}

fn staging_path(live_link: &Path) -> PathBuf {
    let mut name = live_link.as_os_str().to_os_string();
    name.push(".staged");
    PathBuf::from(name)
}

#[cfg(test)]
#[path = "swappable_tests.rs"]
mod tests;
