// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bridge::FakeRebootBridge;
use crate::strategy::{BasicStrategy, SeamlessStrategy};
use std::path::Path;
use vigil_core::{
    AccessIdentifier, CompileJob, CompileJobId, DeployJobId, LaunchSecurityLevel, LaunchSettings,
    LaunchVisibility, ReattachInformation,
};
use vigil_deployment::LocalDmbFactory;
use vigil_process::FakeProcessExecutor;
use vigil_session::{FakeTopicClient, JsonSessionStore, SessionStore};

fn make_job(root: &Path, name: &str) -> CompileJob {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    CompileJob {
        id: CompileJobId::from_string(format!("cj-{name}")),
        deploy_job_id: DeployJobId::new(),
        engine_version: "1.5".to_string(),
        entry_point: "app.bin".to_string(),
        directory: dir,
    }
}

fn quick_config() -> WatchdogConfig {
    WatchdogConfig {
        restart_delay: Duration::from_millis(10),
        shutdown_grace: Duration::from_millis(20),
        ..WatchdogConfig::default()
    }
}

struct Fixture {
    tmp: tempfile::TempDir,
    executor: FakeProcessExecutor,
    factory: Arc<LocalDmbFactory>,
    store: Arc<JsonSessionStore>,
    topic: FakeTopicClient,
    bridge: FakeRebootBridge,
    instance: Instance,
}

impl Fixture {
    async fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let factory = LocalDmbFactory::open(tmp.path()).unwrap();
        let store = Arc::new(JsonSessionStore::open(tmp.path().join("sessions.json")).unwrap());
        let instance = Instance {
            id: vigil_core::InstanceId::new(),
            name: "game".to_string(),
            launch: LaunchSettings::default(),
        };
        store
            .set_topic_timeout_ms(&instance.id, 500)
            .await
            .unwrap();
        Self {
            tmp,
            executor: FakeProcessExecutor::new(),
            factory,
            store,
            topic: FakeTopicClient::new(),
            bridge: FakeRebootBridge::new(),
            instance,
        }
    }

    fn deploy(&self, name: &str) -> CompileJob {
        let job = make_job(self.tmp.path(), name);
        self.factory.deploy(job.clone()).unwrap();
        job
    }

    fn persistor(&self) -> SessionPersistor {
        SessionPersistor::new(
            self.instance.id.clone(),
            self.store.clone(),
            Arc::new(self.executor.clone()),
            self.factory.clone(),
        )
    }

    fn spawn(
        &self,
        strategy: Box<dyn DeployStrategy>,
        config: WatchdogConfig,
    ) -> (
        tokio::task::JoinHandle<Result<(), WatchdogError>>,
        WatchdogHandle,
    ) {
        let (watchdog, handle) = Watchdog::new(
            self.instance.clone(),
            config,
            Arc::new(self.executor.clone()),
            self.factory.clone(),
            Arc::new(self.topic.clone()),
            Arc::new(self.bridge.clone()),
            self.persistor(),
            strategy,
        );
        (tokio::spawn(watchdog.run()), handle)
    }
}

async fn wait_state(handle: &WatchdogHandle, state: WatchdogState) {
    let mut rx = handle.state_receiver();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .unwrap()
        .unwrap();
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never satisfied");
}

#[tokio::test]
async fn fresh_launch_runs_and_records_the_session() {
    let fx = Fixture::new().await;
    let job = fx.deploy("v1");
    let (task, handle) = fx.spawn(Box::new(BasicStrategy::new()), quick_config());

    wait_state(&handle, WatchdogState::Running).await;
    assert_eq!(fx.executor.launches().len(), 1);
    let rows = fx.store.rows(&fx.instance.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].info.process_id, fx.executor.last_pid().unwrap());
    assert_eq!(rows[0].info.compile_job_id, job.id);
    assert_eq!(handle.active_compile_job().map(|j| j.id), Some(job.id.clone()));

    handle.shutdown();
    task.await.unwrap().unwrap();
    // A clean shutdown leaves no record behind.
    assert!(fx.store.rows(&fx.instance.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn waits_without_a_session_until_a_deployment_arrives() {
    let fx = Fixture::new().await;
    let (task, handle) = fx.spawn(Box::new(BasicStrategy::new()), quick_config());

    wait_state(&handle, WatchdogState::NoSession).await;
    assert!(fx.executor.launches().is_empty());

    fx.deploy("v1");
    wait_state(&handle, WatchdogState::Running).await;
    assert_eq!(fx.executor.launches().len(), 1);

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn relaunches_after_an_unexpected_exit() {
    let fx = Fixture::new().await;
    fx.deploy("v1");
    let (task, handle) = fx.spawn(Box::new(BasicStrategy::new()), quick_config());

    wait_state(&handle, WatchdogState::Running).await;
    let first_pid = fx.executor.last_pid().unwrap();
    fx.executor.exit(first_pid, 1);

    eventually(|| fx.executor.launches().len() == 2).await;
    wait_state(&handle, WatchdogState::Running).await;
    assert_ne!(fx.executor.last_pid().unwrap(), first_pid);

    // The record follows the replacement process.
    let rows = fx.store.rows(&fx.instance.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].info.process_id, fx.executor.last_pid().unwrap());

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn gives_up_after_the_crash_budget_is_spent() {
    let fx = Fixture::new().await;
    fx.deploy("v1");
    let config = WatchdogConfig {
        restart_attempts: 1,
        ..quick_config()
    };
    let (task, handle) = fx.spawn(Box::new(BasicStrategy::new()), config);

    wait_state(&handle, WatchdogState::Running).await;
    fx.executor.exit(fx.executor.last_pid().unwrap(), 1);
    eventually(|| fx.executor.launches().len() == 2).await;
    fx.executor.exit(fx.executor.last_pid().unwrap(), 1);

    wait_state(&handle, WatchdogState::Stopped).await;
    assert_eq!(fx.executor.launches().len(), 2);
    assert!(fx.store.rows(&fx.instance.id).await.unwrap().is_empty());

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_interrupts_the_restart_delay() {
    let fx = Fixture::new().await;
    fx.deploy("v1");
    let config = WatchdogConfig {
        restart_delay: Duration::from_secs(30),
        ..quick_config()
    };
    let (task, handle) = fx.spawn(Box::new(BasicStrategy::new()), config);

    wait_state(&handle, WatchdogState::Running).await;
    fx.executor.exit(fx.executor.last_pid().unwrap(), 1);
    // The record is cleared before the delay starts; once it is gone the
    // monitor is inside the relaunch pause.
    for _ in 0..500 {
        if fx.store.rows(&fx.instance.id).await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(fx.store.rows(&fx.instance.id).await.unwrap().is_empty());

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("shutdown stalled in the restart delay")
        .unwrap()
        .unwrap();
    assert_eq!(fx.executor.launches().len(), 1);
}

#[tokio::test]
async fn stop_command_ends_the_session_and_clears_the_record() {
    let fx = Fixture::new().await;
    fx.deploy("v1");
    let (task, handle) = fx.spawn(Box::new(BasicStrategy::new()), quick_config());

    wait_state(&handle, WatchdogState::Running).await;
    let pid = fx.executor.last_pid().unwrap();

    assert!(handle.send(WatchdogCommand::Stop).await);
    wait_state(&handle, WatchdogState::Stopped).await;
    // The fake child acknowledged the shutdown topic but never exited, so
    // the grace period elapsed and it was killed.
    assert!(fx.executor.was_terminated(pid));
    assert!(fx.store.rows(&fx.instance.id).await.unwrap().is_empty());

    // Start brings a fresh session back up.
    assert!(handle.send(WatchdogCommand::Start).await);
    wait_state(&handle, WatchdogState::Running).await;
    assert_eq!(fx.executor.launches().len(), 2);

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn graceful_intent_ends_the_session_at_the_reboot_point() {
    let fx = Fixture::new().await;
    fx.deploy("v1");
    let (task, handle) = fx.spawn(Box::new(BasicStrategy::new()), quick_config());

    wait_state(&handle, WatchdogState::Running).await;
    assert!(handle
        .send(WatchdogCommand::SetRebootState(RebootState::Graceful))
        .await);
    wait_state(&handle, WatchdogState::AwaitingReboot).await;

    // The armed intent is mirrored into the durable record.
    let rows = fx.store.rows(&fx.instance.id).await.unwrap();
    assert_eq!(rows[0].info.reboot_state, RebootState::Graceful);

    fx.bridge.signal_reboot().await;
    wait_state(&handle, WatchdogState::Stopped).await;
    assert!(fx.store.rows(&fx.instance.id).await.unwrap().is_empty());

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn basic_strategy_restarts_onto_a_new_deployment() {
    let fx = Fixture::new().await;
    fx.deploy("v1");
    let (task, handle) = fx.spawn(Box::new(BasicStrategy::new()), quick_config());

    wait_state(&handle, WatchdogState::Running).await;
    let first_pid = fx.executor.last_pid().unwrap();

    let v2 = fx.deploy("v2");
    eventually(|| fx.executor.launches().len() == 2).await;
    assert!(fx.executor.was_terminated(first_pid));
    let launches = fx.executor.launches();
    assert_eq!(launches[1].working_dir, v2.directory);

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn seamless_strategy_swaps_at_the_reboot_point_without_a_relaunch() {
    let fx = Fixture::new().await;
    let v1 = fx.deploy("v1");
    let live_link = fx.tmp.path().join("live");
    let strategy = Box::new(SeamlessStrategy::new(&live_link));
    let (task, handle) = fx.spawn(strategy, quick_config());

    wait_state(&handle, WatchdogState::Running).await;
    assert_eq!(fx.executor.launches()[0].working_dir, live_link);
    assert_eq!(std::fs::read_link(&live_link).unwrap(), v1.directory);

    let v2 = fx.deploy("v2");
    wait_state(&handle, WatchdogState::SwappingDeployment).await;
    // Staged, not yet applied: the link already points at the replacement
    // but the child keeps running.
    assert_eq!(std::fs::read_link(&live_link).unwrap(), v2.directory);
    assert_eq!(fx.executor.launches().len(), 1);

    fx.bridge.signal_reboot().await;
    wait_state(&handle, WatchdogState::Running).await;
    assert_eq!(fx.executor.launches().len(), 1);
    let rows = fx.store.rows(&fx.instance.id).await.unwrap();
    assert_eq!(rows[0].info.compile_job_id, v2.id);

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn reattaches_to_a_recorded_process_instead_of_launching() {
    let fx = Fixture::new().await;
    let job = fx.deploy("v1");

    fx.executor.register_running(4242);
    fx.persistor()
        .save(ReattachInformation {
            access_identifier: AccessIdentifier::generate(),
            compile_job_id: job.id.clone(),
            port: 9100,
            process_id: 4242,
            reboot_state: RebootState::Normal,
            security_level: LaunchSecurityLevel::Safe,
            visibility: LaunchVisibility::Public,
        })
        .await
        .unwrap();

    let (task, handle) = fx.spawn(Box::new(BasicStrategy::new()), quick_config());
    wait_state(&handle, WatchdogState::Running).await;
    assert!(fx.executor.launches().is_empty());

    handle.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn stale_record_falls_back_to_a_fresh_launch() {
    let fx = Fixture::new().await;
    let job = fx.deploy("v1");

    // Recorded pid was never registered with the executor: the process died
    // while the supervisor was down.
    fx.persistor()
        .save(ReattachInformation {
            access_identifier: AccessIdentifier::generate(),
            compile_job_id: job.id.clone(),
            port: 9100,
            process_id: 555,
            reboot_state: RebootState::Normal,
            security_level: LaunchSecurityLevel::Safe,
            visibility: LaunchVisibility::Public,
        })
        .await
        .unwrap();

    let (task, handle) = fx.spawn(Box::new(BasicStrategy::new()), quick_config());
    wait_state(&handle, WatchdogState::Running).await;
    assert_eq!(fx.executor.launches().len(), 1);
    let rows = fx.store.rows(&fx.instance.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].info.process_id, fx.executor.last_pid().unwrap());

    handle.shutdown();
    task.await.unwrap().unwrap();
}
