// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One supervised session: a child process plus the state to talk to it.

use crate::bridge::{RebootBridge, RebootListener};
use crate::strategy::PreparedLaunch;
use crate::WatchdogError;
use std::sync::Arc;
use std::time::Duration;
use vigil_core::{
    AccessIdentifier, CompileJob, LaunchSecurityLevel, LaunchSettings, LaunchVisibility,
    ReattachInformation, RebootState,
};
use vigil_deployment::Dmb;
use vigil_process::{ExitStatus, LaunchSpec, ProcessExecutor, ProcessHandle};
use vigil_session::{ReattachedSession, TopicClient, TopicCommand, TopicRequest};

/// What the monitor loop should react to next.
#[derive(Debug)]
pub enum ControllerEvent {
    /// The child process exited.
    Exited(ExitStatus),
    /// The child signaled a reboot point.
    Reboot,
}

/// A live supervised session.
///
/// Owns the process handle, the claim on the artifact the process launched
/// from (when the deploy strategy does not hold it itself), and the reboot
/// bridge listener. All mutation happens on the monitor-loop task.
pub struct SessionController {
    handle: Arc<dyn ProcessHandle>,
    info: ReattachInformation,
    compile_job: CompileJob,
    _dmb: Option<Dmb>,
    topic: Arc<dyn TopicClient>,
    topic_timeout: Duration,
    reboot_listener: RebootListener,
}

impl SessionController {
    /// Launch a fresh child process from `prepared`.
    pub async fn launch(
        executor: &Arc<dyn ProcessExecutor>,
        topic: Arc<dyn TopicClient>,
        bridge: &Arc<dyn RebootBridge>,
        prepared: PreparedLaunch,
        settings: &LaunchSettings,
        topic_timeout: Duration,
    ) -> Result<Self, WatchdogError> {
        let access = AccessIdentifier::generate();
        let reboot_listener = bridge.open(settings.bridge_port, &access).await?;

        let spec = LaunchSpec {
            program: prepared.run_dir.join(&prepared.compile_job.entry_point),
            args: vec![
                format!("--port={}", settings.port),
                format!("--bridge-port={}", reboot_listener.port()),
                format!("--access-identifier={}", access.as_str()),
                format!("--security={}", security_arg(settings.security_level)),
                format!("--visibility={}", visibility_arg(settings.visibility)),
            ],
            working_dir: prepared.run_dir.clone(),
            high_priority: settings.high_priority,
        };
        let handle = executor.launch(spec).await?;

        let info = ReattachInformation {
            access_identifier: access,
            compile_job_id: prepared.compile_job.id.clone(),
            port: settings.port,
            process_id: handle.pid(),
            reboot_state: RebootState::Normal,
            security_level: settings.security_level,
            visibility: settings.visibility,
        };
        tracing::info!(
            pid = info.process_id,
            compile_job = %info.compile_job_id,
            port = info.port,
            "child process launched"
        );

        Ok(Self {
            handle,
            info,
            compile_job: prepared.compile_job,
            _dmb: prepared.dmb,
            topic,
            topic_timeout,
            reboot_listener,
        })
    }

    /// Reconnect to an already-running child process.
    ///
    /// Returns `Ok(None)` when the recorded process is gone; the caller
    /// starts a fresh session instead.
    pub async fn reattach(
        executor: &Arc<dyn ProcessExecutor>,
        topic: Arc<dyn TopicClient>,
        bridge: &Arc<dyn RebootBridge>,
        session: ReattachedSession,
        bridge_port: u16,
    ) -> Result<Option<Self>, WatchdogError> {
        let Some(handle) = executor.attach(session.info.process_id).await? else {
            tracing::warn!(
                pid = session.info.process_id,
                "recorded process no longer exists, cannot reattach"
            );
            return Ok(None);
        };
        let reboot_listener = bridge
            .open(bridge_port, &session.info.access_identifier)
            .await?;

        tracing::info!(
            pid = session.info.process_id,
            compile_job = %session.info.compile_job_id,
            "reattached to running child process"
        );
        Ok(Some(Self {
            handle,
            compile_job: session.dmb.compile_job().clone(),
            _dmb: Some(session.dmb),
            info: session.info,
            topic,
            topic_timeout: session.topic_timeout,
            reboot_listener,
        }))
    }

    pub fn pid(&self) -> u32 {
        self.info.process_id
    }

    /// The artifact the child is authoritatively running.
    pub fn compile_job(&self) -> &CompileJob {
        &self.compile_job
    }

    /// The record to persist for this session, reflecting current state.
    pub fn reattach_info(&self) -> &ReattachInformation {
        &self.info
    }

    pub fn reboot_state(&self) -> RebootState {
        self.info.reboot_state
    }

    /// Arm (or clear) the in-flight reboot intent. Persisting the change is
    /// the caller's responsibility.
    pub fn set_reboot_state(&mut self, state: RebootState) {
        self.info.reboot_state = state;
    }

    /// Record a deployment swap applied at a reboot point.
    pub fn replace_compile_job(&mut self, job: CompileJob) {
        self.info.compile_job_id = job.id.clone();
        self.compile_job = job;
    }

    pub fn has_exited(&self) -> bool {
        self.handle.has_exited()
    }

    pub fn suspend(&self) -> Result<(), vigil_process::ProcessError> {
        self.handle.suspend()
    }

    pub fn resume(&self) -> Result<(), vigil_process::ProcessError> {
        self.handle.resume()
    }

    /// Wait for the next thing the loop must react to: process exit or a
    /// child-signaled reboot point.
    pub async fn next_event(&mut self) -> ControllerEvent {
        tokio::select! {
            status = self.handle.wait() => ControllerEvent::Exited(status),
            notice = self.reboot_listener.recv() => match notice {
                Some(_) => ControllerEvent::Reboot,
                // Bridge closed: only the exit remains observable.
                None => ControllerEvent::Exited(self.handle.wait().await),
            },
        }
    }

    /// Tell the child about a changed reboot intent. Best effort.
    pub async fn notify_reboot_state(&self, state: RebootState) {
        let request = self.request(TopicCommand::SetRebootState { state });
        if let Err(error) = self
            .topic
            .send(self.info.port, request, self.topic_timeout)
            .await
        {
            tracing::warn!(pid = self.pid(), %error, "failed to notify child of reboot state");
        }
    }

    /// Ask the child to shut down, then kill it if it outlives `grace`.
    pub async fn graceful_shutdown(&self, grace: Duration) -> Result<(), WatchdogError> {
        if self.handle.has_exited() {
            return Ok(());
        }

        let request = self.request(TopicCommand::Shutdown);
        match self
            .topic
            .send(self.info.port, request, self.topic_timeout)
            .await
        {
            Ok(response) if response.ok => {
                tracing::debug!(pid = self.pid(), "child acknowledged shutdown");
            }
            Ok(response) => {
                tracing::warn!(
                    pid = self.pid(),
                    message = response.message.as_deref().unwrap_or(""),
                    "child rejected shutdown request"
                );
            }
            Err(error) => {
                tracing::warn!(pid = self.pid(), %error, "shutdown topic call failed");
            }
        }

        if tokio::time::timeout(grace, self.handle.wait())
            .await
            .is_err()
        {
            tracing::warn!(pid = self.pid(), ?grace, "child did not exit in time, killing");
            self.handle.terminate()?;
            self.handle.wait().await;
        }
        Ok(())
    }

    fn request(&self, command: TopicCommand) -> TopicRequest {
        TopicRequest {
            access_identifier: self.info.access_identifier.clone(),
            command,
        }
    }
}

fn security_arg(level: LaunchSecurityLevel) -> &'static str {
    match level {
        LaunchSecurityLevel::Trusted => "trusted",
        LaunchSecurityLevel::Safe => "safe",
        LaunchSecurityLevel::Ultrasafe => "ultrasafe",
    }
}

fn visibility_arg(visibility: LaunchVisibility) -> &'static str {
    match visibility {
        LaunchVisibility::Public => "public",
        LaunchVisibility::Private => "private",
        LaunchVisibility::Invisible => "invisible",
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
