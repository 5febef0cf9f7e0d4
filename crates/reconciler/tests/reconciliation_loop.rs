//! End-to-end behaviours of the reconciliation loop.
//!
//! NO NETWORK - the loop runs against the in-memory store and substrate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reshard_reconciler::{
    EnsureOutcome, Error, InMemoryJobSubstrate, InMemoryResourceStore, JobCounters, JobOrchestrator,
    JobSpec, JobStatus, LoopConfig, Reconciler, ReconciliationLoop, Resource, RetryPolicy, Step,
    StepOutcome, StoreStatusUpdater, SubstrateOrchestrator,
};

struct World {
    runner: ReconciliationLoop,
    store: Arc<InMemoryResourceStore>,
    substrate: Arc<InMemoryJobSubstrate>,
}

fn world(resources: Vec<Resource>, substrate: InMemoryJobSubstrate) -> World {
    let store = Arc::new(InMemoryResourceStore::new(resources));
    let substrate = Arc::new(substrate);
    let reconciler = Arc::new(Reconciler::with_backends(
        store.clone(),
        substrate.clone(),
        RetryPolicy::default(),
    ));
    let runner = ReconciliationLoop::new(
        reconciler,
        store.clone(),
        LoopConfig {
            interval: Duration::from_millis(10),
        },
    );
    World {
        runner,
        store,
        substrate,
    }
}

async fn step_of(store: &InMemoryResourceStore, name: &str) -> Option<String> {
    store.get(name).await.and_then(|r| r.step)
}

#[tokio::test]
async fn given_new_pending_resource_when_first_iteration_then_job_created_and_step_kept() {
    let idx1 = Resource::new("idx1")
        .with_indices("a", "b")
        .with_step(Step::Pending);
    let w = world(vec![idx1.clone()], InMemoryJobSubstrate::new());

    let report = w.runner.reconcile_once().await;

    assert_eq!(report.listed, 1);
    assert_eq!(w.substrate.job_names().await, vec!["pending-idx1"]);
    assert_eq!(w.store.get("idx1").await, Some(idx1.clone()));

    // Continuing: once the job succeeds the next iteration advances exactly one field.
    w.substrate
        .set_counters("pending-idx1", JobCounters::succeeded())
        .await;
    let report = w.runner.reconcile_once().await;

    assert_eq!(report.advanced_count(), 1);
    assert_eq!(
        w.store.get("idx1").await,
        Some(Resource {
            step: Some("CREATING_INDEX".to_owned()),
            ..idx1
        })
    );
}

#[tokio::test]
async fn given_always_succeeding_jobs_then_resource_walks_whole_pipeline_and_stops_at_cleanup() {
    let w = world(
        vec![Resource::new("idx1")
            .with_indices("a", "b")
            .with_step(Step::Pending)],
        InMemoryJobSubstrate::new().with_initial_counters(JobCounters::succeeded()),
    );

    let mut visited = Vec::new();
    for _ in 0..5 {
        w.runner.reconcile_once().await;
        visited.push(step_of(&w.store, "idx1").await);
    }

    assert_eq!(
        visited,
        vec![
            Some("CREATING_INDEX".to_owned()),
            Some("ENABLE_DW".to_owned()),
            Some("REINDEXING".to_owned()),
            Some("READ_SWAPPED".to_owned()),
            Some("CLEANUP".to_owned()),
        ]
    );

    for _ in 0..3 {
        let report = w.runner.reconcile_once().await;
        assert!(report.converged());
        assert_eq!(step_of(&w.store, "idx1").await, Some("CLEANUP".to_owned()));
    }

    assert_eq!(w.store.patch_calls(), 5);
    assert_eq!(
        w.substrate.job_names().await,
        vec![
            "cleanup-idx1",
            "creating-index-idx1",
            "enable-dw-idx1",
            "pending-idx1",
            "read-swapped-idx1",
            "reindexing-idx1",
        ]
    );
    assert_eq!(w.substrate.create_calls(), 6);
}

#[tokio::test]
async fn given_unknown_step_with_succeeding_jobs_then_resource_restarts_from_pending() {
    let w = world(
        vec![Resource::new("idx1")
            .with_indices("a", "b")
            .with_raw_step("SWAP_READING")],
        InMemoryJobSubstrate::new().with_initial_counters(JobCounters::succeeded()),
    );

    w.runner.reconcile_once().await;
    assert_eq!(step_of(&w.store, "idx1").await, Some("PENDING".to_owned()));

    w.runner.reconcile_once().await;
    assert_eq!(
        step_of(&w.store, "idx1").await,
        Some("CREATING_INDEX".to_owned())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_one_resource_erroring_then_others_in_same_iteration_still_complete() {
    let w = world(
        vec![
            Resource::new("a")
                .with_indices("src-a", "dst-a")
                .with_step(Step::Reindexing),
            Resource::new("b")
                .with_indices("src-b", "dst-b")
                .with_step(Step::Reindexing),
            Resource::new("c").with_step(Step::Pending),
        ],
        InMemoryJobSubstrate::new().with_initial_counters(JobCounters::succeeded()),
    );
    w.substrate
        .fail_reads_of("reindexing-a", Error::substrate_failed("read", "connection reset"))
        .await;

    let report = w.runner.reconcile_once().await;

    assert_eq!(report.listed, 3);
    assert!(matches!(
        report.outcome_for("a"),
        Some(StepOutcome::Errored { .. })
    ));
    assert_eq!(
        report.outcome_for("b"),
        Some(&StepOutcome::Advanced {
            job: "reindexing-b".to_owned(),
            to: Step::ReadSwapped
        })
    );
    assert!(matches!(
        report.outcome_for("c"),
        Some(StepOutcome::Skipped { .. })
    ));
    assert_eq!(step_of(&w.store, "a").await, Some("REINDEXING".to_owned()));
    assert_eq!(step_of(&w.store, "b").await, Some("READ_SWAPPED".to_owned()));
}

/// Job orchestrator that fails every call for one resource.
struct FlakyFor {
    resource: &'static str,
    inner: SubstrateOrchestrator,
}

#[async_trait]
impl JobOrchestrator for FlakyFor {
    async fn ensure(&self, job: &JobSpec) -> reshard_reconciler::Result<EnsureOutcome> {
        if job.resource == self.resource {
            return Err(Error::substrate_failed("create", "admission webhook denied"));
        }
        self.inner.ensure(job).await
    }

    async fn poll(&self, name: &str) -> reshard_reconciler::Result<JobStatus> {
        self.inner.poll(name).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_custom_orchestrator_failing_one_resource_then_siblings_advance() {
    let store = Arc::new(InMemoryResourceStore::new([
        Resource::new("bad")
            .with_indices("a", "b")
            .with_step(Step::Pending),
        Resource::new("good")
            .with_indices("a", "b")
            .with_step(Step::Pending),
    ]));
    let substrate = Arc::new(
        InMemoryJobSubstrate::new().with_initial_counters(JobCounters::succeeded()),
    );
    let jobs = Arc::new(FlakyFor {
        resource: "bad",
        inner: SubstrateOrchestrator::new(substrate.clone()),
    });
    let reconciler = Arc::new(Reconciler::new(
        jobs,
        Arc::new(StoreStatusUpdater::new(store.clone())),
    ));
    let runner = ReconciliationLoop::new(reconciler, store.clone(), LoopConfig::default());

    let report = runner.reconcile_once().await;

    assert_eq!(report.errored_count(), 1);
    assert_eq!(report.advanced_count(), 1);
    assert_eq!(step_of(&store, "bad").await, Some("PENDING".to_owned()));
    assert_eq!(step_of(&store, "good").await, Some("CREATING_INDEX".to_owned()));
}

/// Job orchestrator whose handler task dies outright for one resource.
struct PanicsFor {
    resource: &'static str,
    inner: SubstrateOrchestrator,
}

#[async_trait]
impl JobOrchestrator for PanicsFor {
    async fn ensure(&self, job: &JobSpec) -> reshard_reconciler::Result<EnsureOutcome> {
        if job.resource == self.resource {
            std::panic::panic_any(format!("orchestrator crashed on {}", job.name));
        }
        self.inner.ensure(job).await
    }

    async fn poll(&self, name: &str) -> reshard_reconciler::Result<JobStatus> {
        self.inner.poll(name).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn given_handler_task_panicking_for_one_resource_then_siblings_still_advance() {
    let store = Arc::new(InMemoryResourceStore::new([
        Resource::new("bad")
            .with_indices("a", "b")
            .with_step(Step::Pending),
        Resource::new("good")
            .with_indices("a", "b")
            .with_step(Step::Pending),
    ]));
    let substrate = Arc::new(
        InMemoryJobSubstrate::new().with_initial_counters(JobCounters::succeeded()),
    );
    let jobs = Arc::new(PanicsFor {
        resource: "bad",
        inner: SubstrateOrchestrator::new(substrate.clone()),
    });
    let reconciler = Arc::new(Reconciler::new(
        jobs,
        Arc::new(StoreStatusUpdater::new(store.clone())),
    ));
    let runner = ReconciliationLoop::new(reconciler, store.clone(), LoopConfig::default());

    let report = runner.reconcile_once().await;

    assert_eq!(report.listed, 2);
    assert_eq!(report.errored_count(), 1);
    assert!(matches!(
        report.outcome_for("bad"),
        Some(StepOutcome::Errored { .. })
    ));
    assert_eq!(report.advanced_count(), 1);
    assert_eq!(step_of(&store, "bad").await, Some("PENDING".to_owned()));
    assert_eq!(step_of(&store, "good").await, Some("CREATING_INDEX".to_owned()));
    assert_eq!(substrate.job_names().await, vec!["pending-good"]);
}

#[tokio::test]
async fn given_list_failure_then_next_iteration_recovers() {
    let w = world(
        vec![Resource::new("idx1")
            .with_indices("a", "b")
            .with_step(Step::Pending)],
        InMemoryJobSubstrate::new(),
    );
    w.store
        .fail_list(Some(Error::store_failed("list", "apiserver unavailable")))
        .await;

    let failed = w.runner.reconcile_once().await;
    assert!(failed.list_error.is_some());
    assert_eq!(w.substrate.create_calls(), 0);

    w.store.fail_list(None).await;
    let recovered = w.runner.reconcile_once().await;
    assert!(recovered.list_error.is_none());
    assert_eq!(w.substrate.create_calls(), 1);
}

#[tokio::test]
async fn given_deleted_resource_then_it_is_no_longer_handled() {
    let w = world(
        vec![
            Resource::new("keep")
                .with_indices("a", "b")
                .with_step(Step::Pending),
            Resource::new("gone")
                .with_indices("a", "b")
                .with_step(Step::Pending),
        ],
        InMemoryJobSubstrate::new(),
    );
    w.runner.reconcile_once().await;

    w.store.remove("gone").await;
    let report = w.runner.reconcile_once().await;

    assert_eq!(report.listed, 1);
    assert!(report.outcome_for("gone").is_none());
}

#[tokio::test]
async fn given_running_loop_when_stopped_then_run_returns_after_iterating() {
    let mut w = world(
        vec![Resource::new("idx1")
            .with_indices("a", "b")
            .with_step(Step::Pending)],
        InMemoryJobSubstrate::new().with_initial_counters(JobCounters::succeeded()),
    );
    let stopper = w.runner.stopper();
    let store = w.store.clone();

    let handle = tokio::spawn(async move { w.runner.run().await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    stopper.stop();

    let joined = tokio::time::timeout(Duration::from_secs(2), handle).await;
    assert!(matches!(joined, Ok(Ok(Ok(())))));
    assert!(store.list_calls() >= 2, "loop should have iterated repeatedly");
    assert_eq!(step_of(&store, "idx1").await, Some("CLEANUP".to_owned()));
}
