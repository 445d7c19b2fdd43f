// Ancestry scan job tests against in-memory fakes

mod common;

use common::{FakeGit, MemoryLedger, RecordingQueue, OWNER, REPO};
use credsweep::error::Error;
use credsweep::model::{AncestryScanPlan, DiffScanPlan, RefScanPlan, Task};
use credsweep::queue::AncestryScanJob;
use credsweep::util::RepoPaths;
use std::sync::Arc;

const SHA: &str = "c0ffee0000000000000000000000000000000001";
const ZERO: &str = "0000000000000000000000000000000000000000";

fn plan(sha: &str, depth: u32) -> AncestryScanPlan {
    AncestryScanPlan {
        owner: OWNER.into(),
        repository: REPO.into(),
        sha: sha.into(),
        depth,
        commit_timestamp: 1_700_000_000,
    }
}

fn job(
    plan: AncestryScanPlan,
    ledger: &Arc<MemoryLedger>,
    git: &Arc<FakeGit>,
    queue: &Arc<RecordingQueue>,
) -> AncestryScanJob {
    AncestryScanJob::new(
        plan,
        ledger.clone(),
        git.clone(),
        queue.clone(),
        RepoPaths::new("/nonexistent/workdir"),
    )
}

fn diff(from: &str, to: &str) -> Task {
    Task::DiffScan(DiffScanPlan {
        owner: OWNER.into(),
        repository: REPO.into(),
        from: from.into(),
        to: to.into(),
    })
}

fn ancestry(sha: &str, depth: u32) -> Task {
    Task::AncestryScan(AncestryScanPlan {
        owner: OWNER.into(),
        repository: REPO.into(),
        sha: sha.into(),
        depth,
        commit_timestamp: 0,
    })
}

#[tokio::test]
async fn test_registered_commit_is_noop() {
    let ledger = Arc::new(MemoryLedger::with_commit(SHA));
    let git = Arc::new(FakeGit::with_parents(SHA, &["p1"]));
    let queue = Arc::new(RecordingQueue::default());

    job(plan(SHA, 3), &ledger, &git, &queue).run().await.unwrap();

    assert!(queue.tasks().is_empty());
    assert_eq!(git.parent_lookups(), 0);
    assert!(ledger.registered().is_empty());
}

#[tokio::test]
async fn test_each_parent_gets_diff_then_ancestry() {
    let ledger = Arc::new(MemoryLedger::default());
    let git = Arc::new(FakeGit::with_parents(SHA, &["p1", "p2", "p3"]));
    let queue = Arc::new(RecordingQueue::default());

    job(plan(SHA, 2), &ledger, &git, &queue).run().await.unwrap();

    assert_eq!(
        queue.tasks(),
        vec![
            diff("p1", SHA),
            ancestry("p1", 1),
            diff("p2", SHA),
            ancestry("p2", 1),
            diff("p3", SHA),
            ancestry("p3", 1),
        ]
    );
    let registered = ledger.registered();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].sha, SHA);
    assert_eq!(registered[0].timestamp, 1_700_000_000);
}

#[tokio::test]
async fn test_depth_zero_enqueues_single_ref_scan() {
    let ledger = Arc::new(MemoryLedger::default());
    let git = Arc::new(FakeGit::with_parents(SHA, &["p1"]));
    let queue = Arc::new(RecordingQueue::default());

    job(plan(SHA, 0), &ledger, &git, &queue).run().await.unwrap();

    assert_eq!(
        queue.tasks(),
        vec![Task::RefScan(RefScanPlan {
            owner: OWNER.into(),
            repository: REPO.into(),
            git_ref: SHA.into(),
        })]
    );
    assert_eq!(git.parent_lookups(), 0);
    assert_eq!(ledger.registered().len(), 1);
}

#[tokio::test]
async fn test_root_commit_registers_without_enqueue() {
    let ledger = Arc::new(MemoryLedger::default());
    let git = Arc::new(FakeGit::with_parents(SHA, &[]));
    let queue = Arc::new(RecordingQueue::default());

    job(plan(SHA, 5), &ledger, &git, &queue).run().await.unwrap();

    assert!(queue.tasks().is_empty());
    assert_eq!(ledger.registered().len(), 1);
}

#[tokio::test]
async fn test_zero_sha_is_treated_as_root() {
    let ledger = Arc::new(MemoryLedger::default());
    let git = Arc::new(FakeGit::default());
    let queue = Arc::new(RecordingQueue::default());

    job(plan(ZERO, 2), &ledger, &git, &queue).run().await.unwrap();

    assert!(queue.tasks().is_empty());
    assert_eq!(git.parent_lookups(), 0);
    assert_eq!(ledger.registered()[0].sha, ZERO);
}

#[tokio::test]
async fn test_enqueue_failure_leaves_commit_unregistered() {
    let ledger = Arc::new(MemoryLedger::default());
    let git = Arc::new(FakeGit::with_parents(SHA, &["p1", "p2"]));
    let queue = Arc::new(RecordingQueue::failing_on(3));

    let err = job(plan(SHA, 1), &ledger, &git, &queue).run().await.unwrap_err();

    assert!(matches!(err, Error::Enqueue(_)));
    assert_eq!(queue.tasks(), vec![diff("p1", SHA), ancestry("p1", 0)]);
    assert!(ledger.registered().is_empty());
}

#[tokio::test]
async fn test_redelivery_after_failure_completes_work() {
    let ledger = Arc::new(MemoryLedger::default());
    let git = Arc::new(FakeGit::with_parents(SHA, &["p1", "p2"]));

    let failing = Arc::new(RecordingQueue::failing_on(1));
    assert!(job(plan(SHA, 1), &ledger, &git, &failing).run().await.is_err());

    let queue = Arc::new(RecordingQueue::default());
    job(plan(SHA, 1), &ledger, &git, &queue).run().await.unwrap();
    assert_eq!(queue.tasks().len(), 4);
    assert_eq!(ledger.registered().len(), 1);
}

#[tokio::test]
async fn test_redelivery_after_success_is_noop() {
    let ledger = Arc::new(MemoryLedger::default());
    let git = Arc::new(FakeGit::with_parents(SHA, &["p1"]));
    let queue = Arc::new(RecordingQueue::default());

    job(plan(SHA, 1), &ledger, &git, &queue).run().await.unwrap();
    job(plan(SHA, 1), &ledger, &git, &queue).run().await.unwrap();

    assert_eq!(queue.tasks().len(), 2);
    assert_eq!(ledger.registered().len(), 1);
    assert_eq!(git.parent_lookups(), 1);
}

#[tokio::test]
async fn test_ledger_lookup_failure_aborts() {
    let ledger = Arc::new(MemoryLedger::failing_lookups());
    let git = Arc::new(FakeGit::with_parents(SHA, &["p1"]));
    let queue = Arc::new(RecordingQueue::default());

    let err = job(plan(SHA, 1), &ledger, &git, &queue).run().await.unwrap_err();

    assert!(matches!(err, Error::Registry(_)));
    assert!(queue.tasks().is_empty());
    assert!(ledger.registered().is_empty());
}

#[tokio::test]
async fn test_registration_failure_is_registry_error() {
    let ledger = Arc::new(MemoryLedger::failing_registrations());
    let git = Arc::new(FakeGit::with_parents(SHA, &[]));
    let queue = Arc::new(RecordingQueue::default());

    let err = job(plan(SHA, 1), &ledger, &git, &queue).run().await.unwrap_err();
    assert!(matches!(err, Error::Registry(_)));
}

#[tokio::test]
async fn test_missing_commit_is_upstream_error() {
    let ledger = Arc::new(MemoryLedger::default());
    let git = Arc::new(FakeGit::default());
    let queue = Arc::new(RecordingQueue::default());

    let err = job(plan(SHA, 1), &ledger, &git, &queue).run().await.unwrap_err();

    assert!(matches!(err, Error::Upstream(_)));
    assert!(queue.tasks().is_empty());
    assert!(ledger.registered().is_empty());
}
