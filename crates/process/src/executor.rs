// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process execution adapter.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors from process operations
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{signal} to pid {pid} failed: {errno}")]
    Signal {
        signal: &'static str,
        pid: u32,
        errno: nix::errno::Errno,
    },

    #[error("launched process has no pid: {0}")]
    NoPid(String),

    #[error("operation not supported: {0}")]
    Unsupported(String),
}

/// Exit information for a finished process.
///
/// `code` is `None` when the exit code could not be observed (signal death,
/// or a process we only attached to after launch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
}

/// Parameters for launching an external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Executable path.
    pub program: PathBuf,
    /// Arguments, already rendered.
    pub args: Vec<String>,
    /// Working directory the process runs from.
    pub working_dir: PathBuf,
    /// Raise scheduling priority after launch (best effort).
    pub high_priority: bool,
}

/// A launched or attached OS process.
///
/// Handles are shared (`Arc`) and every method takes `&self`; `wait` may be
/// awaited by multiple callers and always resolves once the process exits.
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// OS process identifier.
    fn pid(&self) -> u32;

    /// Resolves when the process exits.
    async fn wait(&self) -> ExitStatus;

    /// Whether the process has already exited.
    fn has_exited(&self) -> bool;

    /// Suspend execution (SIGSTOP). Not supported on every platform state.
    fn suspend(&self) -> Result<(), ProcessError>;

    /// Resume a suspended process (SIGCONT).
    fn resume(&self) -> Result<(), ProcessError>;

    /// Hard-kill the process.
    fn terminate(&self) -> Result<(), ProcessError>;
}

/// Adapter for launching and reattaching to external processes
#[async_trait]
pub trait ProcessExecutor: Send + Sync + 'static {
    /// Launch a new process from `spec`.
    async fn launch(&self, spec: LaunchSpec) -> Result<Arc<dyn ProcessHandle>, ProcessError>;

    /// Attach to an already-running process by pid.
    ///
    /// Returns `Ok(None)` if no such process exists.
    async fn attach(&self, pid: u32) -> Result<Option<Arc<dyn ProcessHandle>>, ProcessError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{ExitStatus, LaunchSpec, ProcessError, ProcessExecutor, ProcessHandle};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::watch;

    struct FakeProc {
        exit_tx: watch::Sender<Option<ExitStatus>>,
        suspends: u32,
        resumes: u32,
        terminated: bool,
    }

    impl FakeProc {
        fn new() -> Self {
            let (exit_tx, _) = watch::channel(None);
            Self {
                exit_tx,
                suspends: 0,
                resumes: 0,
                terminated: false,
            }
        }

        fn exited(&self) -> bool {
            self.exit_tx.borrow().is_some()
        }
    }

    #[derive(Default)]
    struct FakeExecState {
        next_pid: u32,
        launches: Vec<LaunchSpec>,
        procs: HashMap<u32, FakeProc>,
        fail_suspend: bool,
        fail_terminate: bool,
    }

    /// Fake process executor for testing.
    ///
    /// Launched and registered processes never exit on their own; tests
    /// drive exits explicitly via [`FakeProcessExecutor::exit`].
    #[derive(Clone)]
    pub struct FakeProcessExecutor {
        inner: Arc<Mutex<FakeExecState>>,
    }

    impl Default for FakeProcessExecutor {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeExecState {
                    next_pid: 1000,
                    ..FakeExecState::default()
                })),
            }
        }
    }

    impl FakeProcessExecutor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register an already-running process for `attach` to find.
        pub fn register_running(&self, pid: u32) {
            self.inner.lock().procs.insert(pid, FakeProc::new());
        }

        /// All launch specs passed to `launch`, in order.
        pub fn launches(&self) -> Vec<LaunchSpec> {
            self.inner.lock().launches.clone()
        }

        /// Pid assigned to the most recent launch.
        pub fn last_pid(&self) -> Option<u32> {
            let state = self.inner.lock();
            state.next_pid.checked_sub(1).filter(|_| !state.launches.is_empty())
        }

        /// Simulate the process exiting with `code`.
        pub fn exit(&self, pid: u32, code: i32) {
            if let Some(proc) = self.inner.lock().procs.get(&pid) {
                // send_replace stores even with no subscribed handles.
                proc.exit_tx.send_replace(Some(ExitStatus { code: Some(code) }));
            }
        }

        pub fn alive(&self, pid: u32) -> bool {
            self.inner
                .lock()
                .procs
                .get(&pid)
                .map(|p| !p.exited())
                .unwrap_or(false)
        }

        pub fn was_terminated(&self, pid: u32) -> bool {
            self.inner
                .lock()
                .procs
                .get(&pid)
                .map(|p| p.terminated)
                .unwrap_or(false)
        }

        pub fn suspend_count(&self, pid: u32) -> u32 {
            self.inner.lock().procs.get(&pid).map(|p| p.suspends).unwrap_or(0)
        }

        pub fn resume_count(&self, pid: u32) -> u32 {
            self.inner.lock().procs.get(&pid).map(|p| p.resumes).unwrap_or(0)
        }

        /// Make subsequent `suspend` calls fail.
        pub fn set_fail_suspend(&self, fail: bool) {
            self.inner.lock().fail_suspend = fail;
        }

        /// Make subsequent `terminate` calls fail.
        pub fn set_fail_terminate(&self, fail: bool) {
            self.inner.lock().fail_terminate = fail;
        }

        fn handle(&self, pid: u32) -> Option<FakeProcessHandle> {
            let state = self.inner.lock();
            let proc = state.procs.get(&pid)?;
            Some(FakeProcessHandle {
                pid,
                exit_rx: proc.exit_tx.subscribe(),
                inner: Arc::clone(&self.inner),
            })
        }
    }

    /// Handle to a fake process.
    #[derive(Clone)]
    pub struct FakeProcessHandle {
        pid: u32,
        exit_rx: watch::Receiver<Option<ExitStatus>>,
        inner: Arc<Mutex<FakeExecState>>,
    }

    #[async_trait]
    impl ProcessHandle for FakeProcessHandle {
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
            let mut state = self.inner.lock();
            if state.fail_suspend {
                return Err(ProcessError::Unsupported("suspend disabled".to_string()));
            }
            if let Some(proc) = state.procs.get_mut(&self.pid) {
                proc.suspends += 1;
            }
            Ok(())
        }

        fn resume(&self) -> Result<(), ProcessError> {
            if let Some(proc) = self.inner.lock().procs.get_mut(&self.pid) {
                proc.resumes += 1;
            }
            Ok(())
        }

        fn terminate(&self) -> Result<(), ProcessError> {
            let mut state = self.inner.lock();
            if state.fail_terminate {
                return Err(ProcessError::Unsupported("terminate disabled".to_string()));
            }
            if let Some(proc) = state.procs.get_mut(&self.pid) {
                proc.terminated = true;
                proc.exit_tx.send_replace(Some(ExitStatus { code: None }));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ProcessExecutor for FakeProcessExecutor {
        async fn launch(&self, spec: LaunchSpec) -> Result<Arc<dyn ProcessHandle>, ProcessError> {
            let pid = {
                let mut state = self.inner.lock();
                let pid = state.next_pid;
                state.next_pid += 1;
                state.launches.push(spec);
                state.procs.insert(pid, FakeProc::new());
                pid
            };
            match self.handle(pid) {
                Some(handle) => Ok(Arc::new(handle)),
                None => Err(ProcessError::NoPid(format!("fake pid {pid}"))),
            }
        }

        async fn attach(
            &self,
            pid: u32,
        ) -> Result<Option<Arc<dyn ProcessHandle>>, ProcessError> {
            let exists = {
                let state = self.inner.lock();
                state.procs.get(&pid).map(|p| !p.exited()).unwrap_or(false)
            };
            if !exists {
                return Ok(None);
            }
            Ok(self
                .handle(pid)
                .map(|h| Arc::new(h) as Arc<dyn ProcessHandle>))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProcessExecutor, FakeProcessHandle};

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
