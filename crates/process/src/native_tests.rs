// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;
use std::time::Duration;

fn sleep_spec(seconds: &str) -> LaunchSpec {
    LaunchSpec {
        program: PathBuf::from("/bin/sleep"),
        args: vec![seconds.to_string()],
        working_dir: std::env::temp_dir(),
        high_priority: false,
    }
}

#[tokio::test]
async fn launch_reports_exit_code() {
    let exec = NativeProcessExecutor::new();
    let handle = exec
        .launch(LaunchSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "exit 7".to_string()],
            working_dir: std::env::temp_dir(),
            high_priority: false,
        })
        .await
        .unwrap();

    let status = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .unwrap();
    assert_eq!(status.code, Some(7));
    assert!(handle.has_exited());
}

#[tokio::test]
async fn launch_missing_program_fails() {
    let exec = NativeProcessExecutor::new();
    let result = exec
        .launch(LaunchSpec {
            program: PathBuf::from("/nonexistent/binary"),
            args: vec![],
            working_dir: std::env::temp_dir(),
            high_priority: false,
        })
        .await;
    assert!(matches!(result, Err(ProcessError::Launch { .. })));
}

#[tokio::test]
async fn terminate_kills_running_process() {
    let exec = NativeProcessExecutor::new();
    let handle = exec.launch(sleep_spec("30")).await.unwrap();
    assert!(!handle.has_exited());

    handle.terminate().unwrap();
    let status = tokio::time::timeout(Duration::from_secs(10), handle.wait())
        .await
        .unwrap();
    // SIGKILL death has no exit code.
    assert_eq!(status.code, None);
}

#[tokio::test]
async fn suspend_and_resume_running_process() {
    let exec = NativeProcessExecutor::new();
    let handle = exec.launch(sleep_spec("30")).await.unwrap();

    handle.suspend().unwrap();
    handle.resume().unwrap();

    handle.terminate().unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(10), handle.wait()).await;
}

#[tokio::test]
async fn attach_returns_none_for_missing_pid() {
    let exec = NativeProcessExecutor::new();
    // Far above any default pid_max.
    let attached = exec.attach(999_999_999).await.unwrap();
    assert!(attached.is_none());
}

#[tokio::test]
async fn attach_observes_process_death() {
    let exec = NativeProcessExecutor::new();
    let launched = exec.launch(sleep_spec("30")).await.unwrap();

    let attached = exec.attach(launched.pid()).await.unwrap().unwrap();
    assert_eq!(attached.pid(), launched.pid());
    assert!(!attached.has_exited());

    launched.terminate().unwrap();
    let status = tokio::time::timeout(Duration::from_secs(10), attached.wait())
        .await
        .unwrap();
    assert_eq!(status.code, None);
}
