// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::factory::{DmbFactory, LocalDmbFactory};
use std::sync::Arc;
use vigil_core::{CompileJob, CompileJobId, DeployJobId};

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

async fn claimed(factory: &Arc<LocalDmbFactory>, job: &CompileJob) -> Dmb {
    factory.from_compile_job(&job.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn make_active_creates_the_live_link() {
    let tmp = tempfile::tempdir().unwrap();
    let factory = LocalDmbFactory::open(tmp.path()).unwrap();
    let job = make_job(tmp.path(), "one");
    factory.deploy(job.clone()).unwrap();

    let link = tmp.path().join("live");
    let swappable = Swappable::new(claimed(&factory, &job).await, &link);

    assert!(!swappable.is_active());
    swappable.make_active().await.unwrap();
    assert!(swappable.is_active());
    assert_eq!(std::fs::read_link(&link).unwrap(), job.directory);
}

#[tokio::test]
async fn make_active_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let factory = LocalDmbFactory::open(tmp.path()).unwrap();
    let job = make_job(tmp.path(), "one");
    factory.deploy(job.clone()).unwrap();

    let link = tmp.path().join("live");
    let swappable = Swappable::new(claimed(&factory, &job).await, &link);

    swappable.make_active().await.unwrap();
    swappable.make_active().await.unwrap();
    assert!(swappable.is_active());
}

#[tokio::test]
async fn make_active_redirects_atomically_between_providers() {
    let tmp = tempfile::tempdir().unwrap();
    let factory = LocalDmbFactory::open(tmp.path()).unwrap();
    let job_a = make_job(tmp.path(), "a");
    let job_b = make_job(tmp.path(), "b");
    factory.deploy(job_a.clone()).unwrap();
    factory.deploy(job_b.clone()).unwrap();

    let link = tmp.path().join("live");
    let swap_a = Swappable::new(claimed(&factory, &job_a).await, &link);
    let swap_b = Swappable::new(claimed(&factory, &job_b).await, &link);

    swap_a.make_active().await.unwrap();
    assert!(swap_a.is_active());
    assert!(!swap_b.is_active());

    // Exactly one provider is ever active: never zero, never two.
    swap_b.make_active().await.unwrap();
    assert!(swap_b.is_active());
    assert!(!swap_a.is_active());
    assert_eq!(std::fs::read_link(&link).unwrap(), job_b.directory);
}

#[tokio::test]
async fn make_active_recovers_from_stale_staging_file() {
    let tmp = tempfile::tempdir().unwrap();
    let factory = LocalDmbFactory::open(tmp.path()).unwrap();
    let job = make_job(tmp.path(), "one");
    factory.deploy(job.clone()).unwrap();

    let link = tmp.path().join("live");
    // Leftover from a hypothetical cancelled earlier attempt.
    let stale = tmp.path().join("live.staged");
    std::os::unix::fs::symlink(tmp.path().join("elsewhere"), &stale).unwrap();

    let swappable = Swappable::new(claimed(&factory, &job).await, &link);
    swappable.make_active().await.unwrap();
    assert!(swappable.is_active());
    assert!(!stale.exists());
}

#[tokio::test]
async fn dropping_swappable_releases_the_claim() {
    let tmp = tempfile::tempdir().unwrap();
    let factory = LocalDmbFactory::open(tmp.path()).unwrap();
    let job = make_job(tmp.path(), "one");
    factory.deploy(job.clone()).unwrap();

    let swappable = Swappable::new(claimed(&factory, &job).await, tmp.path().join("live"));
    assert_eq!(factory.ledger().count(&job.id), 1);
    drop(swappable);
    assert_eq!(factory.ledger().count(&job.id), 0);
}
