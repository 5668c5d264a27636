// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native process executor backed by `tokio::process` and POSIX signals.

use crate::executor::{ExitStatus, LaunchSpec, ProcessError, ProcessExecutor, ProcessHandle};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How often an attached (not launched) process is probed for liveness.
const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Launches processes natively and tracks their lifetimes.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeProcessExecutor;

impl NativeProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessExecutor for NativeProcessExecutor {
    async fn launch(&self, spec: LaunchSpec) -> Result<Arc<dyn ProcessHandle>, ProcessError> {
        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            // The child must outlive this supervisor for reattachment to work.
            .kill_on_drop(false);

        let mut child = command.spawn().map_err(|source| ProcessError::Launch {
            program: spec.program.display().to_string(),
            source,
        })?;

        let pid = child
            .id()
            .ok_or_else(|| ProcessError::NoPid(spec.program.display().to_string()))?;

        tracing::info!(pid, program = %spec.program.display(), "launched process");

        if spec.high_priority {
            raise_priority(pid).await;
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            let status = child.wait().await;
            let code = status.ok().and_then(|s| s.code());
            tracing::info!(pid, code, "process exited");
            let _ = exit_tx.send(Some(ExitStatus { code }));
        });

        Ok(Arc::new(NativeProcessHandle { pid, exit_rx }))
    }

    async fn attach(&self, pid: u32) -> Result<Option<Arc<dyn ProcessHandle>>, ProcessError> {
        if !process_exists(pid)? {
            return Ok(None);
        }

        // We did not launch this process, so its exit code is unobservable;
        // poll for disappearance instead.
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(ATTACH_POLL_INTERVAL).await;
                if exit_tx.is_closed() {
                    return;
                }
                match process_exists(pid) {
                    Ok(true) => {}
                    Ok(false) | Err(_) => {
                        tracing::info!(pid, "attached process is gone");
                        let _ = exit_tx.send(Some(ExitStatus { code: None }));
                        return;
                    }
                }
            }
        });

        tracing::info!(pid, "attached to existing process");
        Ok(Some(Arc::new(NativeProcessHandle { pid, exit_rx })))
    }
}

/// Handle to a natively launched or attached process.
pub(crate) struct NativeProcessHandle {
    pid: u32,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
}

impl NativeProcessHandle {
    fn send_signal(&self, name: &'static str, sig: Signal) -> Result<(), ProcessError> {
        signal::kill(Pid::from_raw(self.pid as i32), sig).map_err(|errno| {
            ProcessError::Signal {
                signal: name,
                pid: self.pid,
                errno,
            }
        })
    }
}

#[async_trait]
impl ProcessHandle for NativeProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn wait(&self) -> ExitStatus {
        let mut rx = self.exit_rx.clone();
        let status = rx
            .wait_for(|status| status.is_some())
            .await
            .map(|status| *status)
            .unwrap_or(None);
        status.unwrap_or(ExitStatus { code: None })
    }

    fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    fn suspend(&self) -> Result<(), ProcessError> {
        self.send_signal("SIGSTOP", Signal::SIGSTOP)
    }

    fn resume(&self) -> Result<(), ProcessError> {
        self.send_signal("SIGCONT", Signal::SIGCONT)
    }

    fn terminate(&self) -> Result<(), ProcessError> {
        self.send_signal("SIGKILL", Signal::SIGKILL)
    }
}

/// Probe a pid for existence without signalling it.
fn process_exists(pid: u32) -> Result<bool, ProcessError> {
    match signal::kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => Ok(true),
        // EPERM means the process exists but belongs to someone else.
        Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(ProcessError::Signal {
            signal: "probe",
            pid,
            errno,
        }),
    }
}

/// Raise a process's scheduling priority via `renice`.
///
/// Raising priority usually needs elevated privileges; failure here is a
/// degraded mode, not an error.
async fn raise_priority(pid: u32) {
    let result = tokio::process::Command::new("renice")
        .args(["-n", "-5", "-p", &pid.to_string()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) if status.success() => {
            tracing::debug!(pid, "raised process priority");
        }
        Ok(status) => {
            tracing::warn!(pid, ?status, "renice failed, continuing at normal priority");
        }
        Err(e) => {
            tracing::warn!(pid, error = %e, "could not run renice, continuing at normal priority");
        }
    }
}

#[cfg(test)]
#[path = "native_tests.rs"]
mod tests;
