// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment-swap strategies.
//!
//! The monitor loop delegates deployment handling to a strategy object
//! selected at construction. [`BasicStrategy`] always does a full graceful
//! restart; [`SeamlessStrategy`] repoints a live filesystem link under the
//! running process when the incoming artifact is compatible, applying the
//! swap only at the child's next reboot point.

use crate::controller::SessionController;
use crate::WatchdogError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use vigil_core::{CompileJob, MonitorAction};
use vigil_deployment::{Dmb, DmbFactory, Swappable};

/// Everything a fresh launch needs from the strategy.
#[derive(Debug)]
pub struct PreparedLaunch {
    pub compile_job: CompileJob,
    /// Directory the process is launched from. For the seamless strategy
    /// this is the live link, not the artifact directory itself.
    pub run_dir: PathBuf,
    /// Artifact claim handed to the session, if the strategy does not keep
    /// the claim itself.
    pub dmb: Option<Dmb>,
}

/// Hook points the monitor loop calls through, selected once per watchdog
#[async_trait]
pub trait DeployStrategy: Send + 'static {
    /// Decide what to do about a newly ready deployment.
    async fn handle_new_dmb(
        &mut self,
        controller: &SessionController,
        factory: &Arc<dyn DmbFactory>,
    ) -> Result<MonitorAction, WatchdogError>;

    /// The child signaled a reboot point; apply any staged swap. Must never
    /// kill the process, the child performs its own reboot.
    async fn handle_reboot(
        &mut self,
        controller: &mut SessionController,
    ) -> Result<(), WatchdogError>;

    /// Claim artifacts and produce launch parameters for a fresh session.
    async fn prepare_for_launch(
        &mut self,
        factory: &Arc<dyn DmbFactory>,
    ) -> Result<PreparedLaunch, WatchdogError>;

    /// Release every claim the strategy holds.
    fn teardown(&mut self);
}

/// Runs asynchronously before a staged swap is committed at a reboot point.
#[async_trait]
pub trait BeforeApplyHook: Send + Sync + 'static {
    async fn before_apply(&self, incoming: &CompileJob);
}

/// Default hook: nothing to do before a swap.
#[derive(Debug, Default, Clone)]
pub struct NoopBeforeApply;

#[async_trait]
impl BeforeApplyHook for NoopBeforeApply {
    async fn before_apply(&self, _incoming: &CompileJob) {}
}

/// Full-restart strategy for hosts without atomic link redirection.
#[derive(Debug, Default)]
pub struct BasicStrategy;

impl BasicStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DeployStrategy for BasicStrategy {
    async fn handle_new_dmb(
        &mut self,
        controller: &SessionController,
        factory: &Arc<dyn DmbFactory>,
    ) -> Result<MonitorAction, WatchdogError> {
        let Some(candidate) = factory.latest_compile_job() else {
            return Ok(MonitorAction::Continue);
        };
        if candidate.id == controller.compile_job().id {
            return Ok(MonitorAction::Continue);
        }
        tracing::info!(
            compile_job = %candidate.id,
            "new deployment ready, full restart required"
        );
        Ok(MonitorAction::Restart)
    }

    async fn handle_reboot(
        &mut self,
        _controller: &mut SessionController,
    ) -> Result<(), WatchdogError> {
        Ok(())
    }

    async fn prepare_for_launch(
        &mut self,
        factory: &Arc<dyn DmbFactory>,
    ) -> Result<PreparedLaunch, WatchdogError> {
        let dmb = factory
            .claim_next()
            .await?
            .ok_or(WatchdogError::NoDeployment)?;
        Ok(PreparedLaunch {
            compile_job: dmb.compile_job().clone(),
            run_dir: dmb.directory().to_path_buf(),
            dmb: Some(dmb),
        })
    }

    fn teardown(&mut self) {}
}

/// Seamless-swap strategy: the process runs from a live link that can be
/// atomically repointed at a compatible replacement artifact.
pub struct SeamlessStrategy {
    live_link: PathBuf,
    /// Provider the live link points at for the current session.
    active: Option<Swappable>,
    /// Staged provider awaiting the next reboot point.
    pending: Option<Swappable>,
    /// Independent claim on the launch artifact, held for the whole process
    /// lifetime because the child may re-read it at any point.
    startup_dmb: Option<Dmb>,
    before_apply: Arc<dyn BeforeApplyHook>,
}

impl SeamlessStrategy {
    pub fn new(live_link: impl Into<PathBuf>) -> Self {
        Self::with_hook(live_link, Arc::new(NoopBeforeApply))
    }

    pub fn with_hook(live_link: impl Into<PathBuf>, before_apply: Arc<dyn BeforeApplyHook>) -> Self {
        Self {
            live_link: live_link.into(),
            active: None,
            pending: None,
            startup_dmb: None,
            before_apply,
        }
    }

    fn current_job<'a>(&'a self, controller: &'a SessionController) -> &'a CompileJob {
        match self.active.as_ref() {
            Some(active) => active.compile_job(),
            // Reattached session: the strategy holds no claims yet.
            None => controller.compile_job(),
        }
    }
}

#[async_trait]
impl DeployStrategy for SeamlessStrategy {
    async fn handle_new_dmb(
        &mut self,
        controller: &SessionController,
        factory: &Arc<dyn DmbFactory>,
    ) -> Result<MonitorAction, WatchdogError> {
        let Some(candidate) = factory.latest_compile_job() else {
            return Ok(MonitorAction::Continue);
        };
        let current = self.current_job(controller);
        if candidate.id == current.id {
            return Ok(MonitorAction::Continue);
        }
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.compile_job().id == candidate.id)
        {
            return Ok(MonitorAction::Continue);
        }
        if !current.swap_compatible(&candidate) {
            tracing::info!(
                active = %current.id,
                candidate = %candidate.id,
                "incompatible deployment, full restart required"
            );
            return Ok(MonitorAction::Restart);
        }

        let Some(dmb) = factory.from_compile_job(&candidate.id).await? else {
            tracing::warn!(compile_job = %candidate.id, "new deployment vanished before staging");
            return Ok(MonitorAction::Continue);
        };
        let swappable = Swappable::new(dmb, &self.live_link);

        // Suspension is best effort: some platform states disallow it, and
        // the redirection is atomic either way.
        let suspended = match controller.suspend() {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(pid = controller.pid(), %error, "could not suspend child for swap");
                false
            }
        };
        let redirected = swappable.make_active().await;
        if suspended {
            if let Err(error) = controller.resume() {
                tracing::warn!(pid = controller.pid(), %error, "failed to resume child after swap");
            }
        }

        match redirected {
            Ok(()) => {
                tracing::info!(
                    compile_job = %candidate.id,
                    "compatible deployment staged, applying at next reboot point"
                );
                self.pending = Some(swappable);
                Ok(MonitorAction::DeferUpdate)
            }
            // The claim is released with the provider; the link still points
            // wherever it did before the attempt.
            Err(error) => Err(error.into()),
        }
    }

    async fn handle_reboot(
        &mut self,
        controller: &mut SessionController,
    ) -> Result<(), WatchdogError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let incoming = pending.compile_job().clone();

        // The before-apply hook runs concurrently with re-asserting the
        // link; both must finish before the swap is committed.
        let (applied, ()) = tokio::join!(
            pending.make_active(),
            self.before_apply.before_apply(&incoming)
        );
        if let Err(error) = applied {
            return Err(error.into());
        }

        // The previous provider's claim is released here.
        self.active = Some(pending);
        controller.replace_compile_job(incoming.clone());
        tracing::info!(compile_job = %incoming.id, "deployment swap applied at reboot point");
        Ok(())
    }

    async fn prepare_for_launch(
        &mut self,
        factory: &Arc<dyn DmbFactory>,
    ) -> Result<PreparedLaunch, WatchdogError> {
        if self.active.is_some() || self.startup_dmb.is_some() {
            return Err(WatchdogError::LaunchPrecondition(
                "a swappable deployment is already active",
            ));
        }

        let swappable = match self.pending.take() {
            Some(staged) => staged,
            None => {
                let dmb = factory
                    .claim_next()
                    .await?
                    .ok_or(WatchdogError::NoDeployment)?;
                Swappable::new(dmb, &self.live_link)
            }
        };
        let job = swappable.compile_job().clone();

        let startup = factory
            .from_compile_job(&job.id)
            .await?
            .ok_or(WatchdogError::NoDeployment)?;

        // Nothing is recorded until the link exists, so a failure here
        // leaves the strategy clean for a retry.
        swappable.make_active().await?;

        self.active = Some(swappable);
        self.startup_dmb = Some(startup);
        Ok(PreparedLaunch {
            compile_job: job,
            run_dir: self.live_link.clone(),
            dmb: None,
        })
    }

    fn teardown(&mut self) {
        // Release order: active, pending, startup claim.
        self.active = None;
        self.pending = None;
        self.startup_dmb = None;
    }
}

#[cfg(test)]
#[path = "strategy_tests.rs"]
mod tests;
