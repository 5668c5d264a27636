// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The monitor loop: one task per instance owning the session lifecycle.

use crate::bridge::RebootBridge;
use crate::controller::{ControllerEvent, SessionController};
use crate::strategy::DeployStrategy;
use crate::WatchdogError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use vigil_core::{CompileJob, Instance, MonitorAction, RebootState, WatchdogState};
use vigil_deployment::DmbFactory;
use vigil_process::{ExitStatus, ProcessExecutor};
use vigil_session::{SessionPersistor, TopicClient};

/// Used when the instance settings carry no topic timeout at launch time.
const DEFAULT_TOPIC_TIMEOUT: Duration = Duration::from_secs(5);

/// Supervision policy knobs.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Relaunch after an unexpected child exit.
    pub auto_restart: bool,
    /// Consecutive unexpected exits tolerated before giving up.
    pub restart_attempts: u32,
    /// Pause between an unexpected exit and the relaunch attempt.
    pub restart_delay: Duration,
    /// How long a child gets to exit after a shutdown request before it is
    /// killed.
    pub shutdown_grace: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            auto_restart: true,
            restart_attempts: 3,
            restart_delay: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

/// Operator commands accepted by the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogCommand {
    /// Launch a session if none is live.
    Start,
    /// End the current session and stay stopped.
    Stop,
    /// End the current session and launch a fresh one.
    Restart,
    /// Arm or clear an in-flight reboot intent.
    SetRebootState(RebootState),
}

/// Control surface for a running [`Watchdog`].
#[derive(Clone)]
pub struct WatchdogHandle {
    commands: mpsc::Sender<WatchdogCommand>,
    state_rx: watch::Receiver<WatchdogState>,
    active_rx: watch::Receiver<Option<CompileJob>>,
    shutdown: CancellationToken,
}

impl WatchdogHandle {
    /// Queue a command for the monitor loop. Returns false once the loop
    /// has ended.
    pub async fn send(&self, command: WatchdogCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Current state machine state.
    pub fn state(&self) -> WatchdogState {
        *self.state_rx.borrow()
    }

    /// Receiver for observing state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<WatchdogState> {
        self.state_rx.clone()
    }

    /// The compile job the live session is authoritatively running, if any.
    pub fn active_compile_job(&self) -> Option<CompileJob> {
        self.active_rx.borrow().clone()
    }

    /// Request a clean end of supervision.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// The supervision engine for one instance.
///
/// Construction is infallible wiring; all fallible work happens in
/// [`Watchdog::run`], which consumes the watchdog and runs the monitor loop
/// until shutdown or a fatal fault.
pub struct Watchdog {
    monitor: Monitor,
    commands: mpsc::Receiver<WatchdogCommand>,
    shutdown: CancellationToken,
}

impl Watchdog {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: Instance,
        config: WatchdogConfig,
        executor: Arc<dyn ProcessExecutor>,
        factory: Arc<dyn DmbFactory>,
        topic: Arc<dyn TopicClient>,
        bridge: Arc<dyn RebootBridge>,
        persistor: SessionPersistor,
        strategy: Box<dyn DeployStrategy>,
    ) -> (Self, WatchdogHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(WatchdogState::NoSession);
        let (active_tx, active_rx) = watch::channel(None);
        let shutdown = CancellationToken::new();

        let handle = WatchdogHandle {
            commands: commands_tx,
            state_rx,
            active_rx,
            shutdown: shutdown.clone(),
        };
        let watchdog = Self {
            monitor: Monitor {
                instance,
                config,
                executor,
                factory,
                topic,
                bridge,
                persistor,
                strategy,
                state_tx,
                active_tx,
                crashes: 0,
            },
            commands: commands_rx,
            shutdown,
        };
        (watchdog, handle)
    }

    /// Run the monitor loop to completion.
    pub async fn run(self) -> Result<(), WatchdogError> {
        let Watchdog {
            mut monitor,
            commands,
            shutdown,
        } = self;
        let result = monitor.run(commands, &shutdown).await;
        if let Err(ref error) = result {
            tracing::error!(instance = %monitor.instance.id, %error, "watchdog terminated");
            monitor.set_state(WatchdogState::Stopped);
            monitor.publish_active(&None);
        }
        result
    }
}

/// What the loop reacts to on one iteration.
enum Step {
    Shutdown,
    Command(Option<WatchdogCommand>),
    NewDeployment,
    DeploymentsClosed,
    Session(ControllerEvent),
}

struct Monitor {
    instance: Instance,
    config: WatchdogConfig,
    executor: Arc<dyn ProcessExecutor>,
    factory: Arc<dyn DmbFactory>,
    topic: Arc<dyn TopicClient>,
    bridge: Arc<dyn RebootBridge>,
    persistor: SessionPersistor,
    strategy: Box<dyn DeployStrategy>,
    state_tx: watch::Sender<WatchdogState>,
    active_tx: watch::Sender<Option<CompileJob>>,
    /// Consecutive unexpected exits; reset by explicit commands and by
    /// healthy reboot points.
    crashes: u32,
}

impl Monitor {
    async fn run(
        &mut self,
        mut commands: mpsc::Receiver<WatchdogCommand>,
        shutdown: &CancellationToken,
    ) -> Result<(), WatchdogError> {
        let mut deploy_rx = self.factory.subscribe();
        let mut deployments_open = true;
        let mut controller = self.start_session().await?;
        self.publish_active(&controller);

        loop {
            let step = tokio::select! {
                _ = shutdown.cancelled() => Step::Shutdown,
                command = commands.recv() => Step::Command(command),
                changed = deploy_rx.changed(), if deployments_open => match changed {
                    Ok(()) => Step::NewDeployment,
                    Err(_) => Step::DeploymentsClosed,
                },
                event = next_session_event(&mut controller) => Step::Session(event),
            };

            match step {
                Step::Shutdown | Step::Command(None) => {
                    tracing::info!(instance = %self.instance.id, "watchdog shutting down");
                    self.stop_session(&mut controller).await?;
                    self.publish_active(&controller);
                    return Ok(());
                }
                Step::Command(Some(command)) => {
                    self.handle_command(command, &mut controller).await?;
                }
                Step::NewDeployment => {
                    self.handle_new_deployment(&mut controller).await?;
                }
                Step::DeploymentsClosed => {
                    tracing::warn!(instance = %self.instance.id, "deployment source closed");
                    deployments_open = false;
                }
                Step::Session(ControllerEvent::Exited(status)) => {
                    self.handle_crash(status, &mut controller, shutdown).await?;
                }
                Step::Session(ControllerEvent::Reboot) => {
                    self.handle_reboot_notice(&mut controller).await?;
                }
            }
            self.publish_active(&controller);
        }
    }

    /// Startup: reattach to a recorded process if possible, else launch.
    async fn start_session(&mut self) -> Result<Option<SessionController>, WatchdogError> {
        self.set_state(WatchdogState::Starting);

        if let Some(session) = self.persistor.load().await? {
            let reattached = SessionController::reattach(
                &self.executor,
                Arc::clone(&self.topic),
                &self.bridge,
                session,
                self.instance.launch.bridge_port,
            )
            .await?;
            match reattached {
                Some(controller) => {
                    self.set_state(WatchdogState::Running);
                    return Ok(Some(controller));
                }
                None => {
                    tracing::warn!(
                        instance = %self.instance.id,
                        "recorded process is gone, starting a fresh session"
                    );
                    self.persistor.clear().await?;
                }
            }
        }
        self.launch_fresh().await
    }

    /// Launch a fresh session from the best available deployment.
    ///
    /// Returns `Ok(None)` (state `NoSession`) when no deployment exists yet;
    /// the loop launches once one becomes ready.
    async fn launch_fresh(&mut self) -> Result<Option<SessionController>, WatchdogError> {
        self.set_state(WatchdogState::Starting);

        let prepared = match self.strategy.prepare_for_launch(&self.factory).await {
            Ok(prepared) => prepared,
            Err(WatchdogError::NoDeployment) => {
                tracing::info!(instance = %self.instance.id, "no deployment available yet");
                self.set_state(WatchdogState::NoSession);
                return Ok(None);
            }
            Err(error) => return Err(error),
        };

        let topic_timeout = self
            .persistor
            .topic_timeout()
            .await?
            .unwrap_or(DEFAULT_TOPIC_TIMEOUT);

        let controller = match SessionController::launch(
            &self.executor,
            Arc::clone(&self.topic),
            &self.bridge,
            prepared,
            &self.instance.launch,
            topic_timeout,
        )
        .await
        {
            Ok(controller) => controller,
            Err(error) => {
                self.strategy.teardown();
                return Err(error);
            }
        };

        // The record must be durable before the session is authoritative.
        // A process we cannot record would be unrecoverable after a
        // supervisor crash, so it dies with the failed save.
        if let Err(error) = self.persistor.save(controller.reattach_info().clone()).await {
            tracing::error!(instance = %self.instance.id, %error, "failed to persist session record");
            if let Err(kill) = controller.graceful_shutdown(Duration::ZERO).await {
                tracing::warn!(pid = controller.pid(), %kill, "failed to kill unrecorded child");
            }
            self.strategy.teardown();
            return Err(error.into());
        }

        self.set_state(WatchdogState::Running);
        Ok(Some(controller))
    }

    /// End the current session: clear the record first, then wind the child
    /// down and release every artifact claim.
    async fn stop_session(
        &mut self,
        controller: &mut Option<SessionController>,
    ) -> Result<(), WatchdogError> {
        self.persistor.clear().await?;
        if let Some(session) = controller.take() {
            session.graceful_shutdown(self.config.shutdown_grace).await?;
        }
        self.strategy.teardown();
        self.set_state(WatchdogState::Stopped);
        Ok(())
    }

    async fn restart_session(
        &mut self,
        controller: &mut Option<SessionController>,
    ) -> Result<(), WatchdogError> {
        self.persistor.clear().await?;
        if let Some(session) = controller.take() {
            session.graceful_shutdown(self.config.shutdown_grace).await?;
        }
        self.strategy.teardown();
        *controller = self.launch_fresh().await?;
        Ok(())
    }

    async fn handle_command(
        &mut self,
        command: WatchdogCommand,
        controller: &mut Option<SessionController>,
    ) -> Result<(), WatchdogError> {
        tracing::debug!(instance = %self.instance.id, ?command, "handling command");
        match command {
            WatchdogCommand::Start => {
                if controller.is_some() {
                    tracing::debug!(instance = %self.instance.id, "already running, ignoring start");
                    return Ok(());
                }
                self.crashes = 0;
                *controller = self.launch_fresh().await?;
                Ok(())
            }
            WatchdogCommand::Stop => self.stop_session(controller).await,
            WatchdogCommand::Restart => {
                self.crashes = 0;
                self.restart_session(controller).await
            }
            WatchdogCommand::SetRebootState(state) => {
                let Some(session) = controller.as_mut() else {
                    tracing::warn!(instance = %self.instance.id, "no session to arm reboot state on");
                    return Ok(());
                };
                session.set_reboot_state(state);
                self.persistor.save(session.reattach_info().clone()).await?;
                session.notify_reboot_state(state).await;
                match state {
                    RebootState::Graceful => self.set_state(WatchdogState::AwaitingReboot),
                    RebootState::Normal | RebootState::Immediate => {
                        self.set_state(WatchdogState::Running)
                    }
                }
                Ok(())
            }
        }
    }

    async fn handle_new_deployment(
        &mut self,
        controller: &mut Option<SessionController>,
    ) -> Result<(), WatchdogError> {
        if controller.is_none() {
            // Auto-launch only while waiting for a first artifact, never
            // over an operator's stop.
            if *self.state_tx.borrow() == WatchdogState::NoSession {
                *controller = self.launch_fresh().await?;
            }
            return Ok(());
        }

        let action = {
            let Some(session) = controller.as_ref() else {
                return Ok(());
            };
            match self.strategy.handle_new_dmb(session, &self.factory).await {
                Ok(action) => action,
                Err(error) => {
                    // The session stays healthy on the old artifact; the
                    // next deployment signal gets another attempt.
                    tracing::error!(instance = %self.instance.id, %error, "deployment staging failed");
                    return Ok(());
                }
            }
        };

        match action {
            MonitorAction::Continue => Ok(()),
            MonitorAction::DeferUpdate => {
                self.set_state(WatchdogState::SwappingDeployment);
                Ok(())
            }
            MonitorAction::Restart => self.restart_session(controller).await,
            MonitorAction::Exit => self.stop_session(controller).await,
        }
    }

    /// The child reached a reboot point.
    async fn handle_reboot_notice(
        &mut self,
        controller: &mut Option<SessionController>,
    ) -> Result<(), WatchdogError> {
        let Some(reboot_state) = controller.as_ref().map(SessionController::reboot_state) else {
            return Ok(());
        };
        match reboot_state {
            RebootState::Graceful => {
                tracing::info!(instance = %self.instance.id, "graceful reboot point, ending session");
                self.stop_session(controller).await
            }
            RebootState::Immediate => {
                tracing::info!(instance = %self.instance.id, "restart intent armed, relaunching");
                self.restart_session(controller).await
            }
            RebootState::Normal => {
                if let Some(session) = controller.as_mut() {
                    if let Err(error) = self.strategy.handle_reboot(session).await {
                        tracing::error!(
                            instance = %self.instance.id,
                            %error,
                            "failed to apply staged deployment at reboot point"
                        );
                    }
                    self.persistor.save(session.reattach_info().clone()).await?;
                }
                self.crashes = 0;
                self.set_state(WatchdogState::Running);
                Ok(())
            }
        }
    }

    /// Unexpected child exit: clear state and relaunch per policy.
    async fn handle_crash(
        &mut self,
        status: ExitStatus,
        controller: &mut Option<SessionController>,
        shutdown: &CancellationToken,
    ) -> Result<(), WatchdogError> {
        let pid = controller.as_ref().map(SessionController::pid);
        tracing::error!(
            instance = %self.instance.id,
            pid,
            code = ?status.code,
            "child process exited unexpectedly"
        );
        *controller = None;
        self.persistor.clear().await?;
        self.strategy.teardown();

        self.crashes += 1;
        if !self.config.auto_restart || self.crashes > self.config.restart_attempts {
            tracing::error!(
                instance = %self.instance.id,
                crashes = self.crashes,
                "not restarting crashed child"
            );
            self.set_state(WatchdogState::Stopped);
            return Ok(());
        }

        tracing::info!(
            instance = %self.instance.id,
            attempt = self.crashes,
            delay = ?self.config.restart_delay,
            "relaunching after crash"
        );
        // The delay must not hold up shutdown; the loop observes the
        // cancellation on its next iteration.
        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            () = tokio::time::sleep(self.config.restart_delay) => {}
        }
        // A failed relaunch is fatal and surfaces to the owner.
        *controller = self.launch_fresh().await?;
        Ok(())
    }

    fn set_state(&self, state: WatchdogState) {
        if *self.state_tx.borrow() != state {
            tracing::debug!(instance = %self.instance.id, ?state, "state transition");
        }
        self.state_tx.send_replace(state);
    }

    /// Mirror the live session's compile job to observers.
    fn publish_active(&self, controller: &Option<SessionController>) {
        let job = controller.as_ref().map(|c| c.compile_job().clone());
        self.active_tx.send_replace(job);
    }
}

async fn next_session_event(controller: &mut Option<SessionController>) -> ControllerEvent {
    match controller.as_mut() {
        Some(session) => session.next_event().await,
        // No session: only commands, deployments, or shutdown can wake us.
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
