//! Step handlers: the resharding state machine.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::orchestrator::{JobOrchestrator, JobSubstrate, SubstrateOrchestrator};
use crate::pipeline;
use crate::status::{ResourceStore, StatusUpdater, StoreStatusUpdater};
use crate::types::{JobSpec, JobStatus, Resource, RetryPolicy, Stage, StepOutcome};

/// Drives one resource one step further through the pipeline.
///
/// Every call is safe to repeat: the job for a (resource, stage) pair is only
/// created once, and a step is only advanced after that job succeeded.
pub struct Reconciler {
    /// Job capability.
    jobs: Arc<dyn JobOrchestrator>,
    /// Status capability.
    status: Arc<dyn StatusUpdater>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(jobs: Arc<dyn JobOrchestrator>, status: Arc<dyn StatusUpdater>) -> Self {
        Self { jobs, status }
    }

    /// Create a reconciler writing through a store and running jobs on a substrate.
    pub fn with_backends(
        store: Arc<dyn ResourceStore>,
        substrate: Arc<dyn JobSubstrate>,
        policy: RetryPolicy,
    ) -> Self {
        let jobs = Arc::new(SubstrateOrchestrator::new(substrate).with_policy(policy));
        let status = Arc::new(StoreStatusUpdater::new(store));
        Self::new(jobs, status)
    }

    /// Run the handler for the resource's current stage.
    ///
    /// Never fails: errors are logged and reported as [`StepOutcome::Errored`],
    /// leaving the resource for the next iteration.
    pub async fn reconcile(&self, resource: &Resource) -> StepOutcome {
        let stage = resource.stage();
        match &stage {
            Stage::Step(step) => info!(resource = %resource.name, "Status is {step}"),
            Stage::Unrecognized(raw) => info!(
                resource = %resource.name,
                value = raw.as_deref().unwrap_or("<absent>"),
                "Unknown status, resetting"
            ),
        }

        let job = match pipeline::job_for(&stage, resource) {
            Ok(job) => job,
            Err(e) => {
                error!(resource = %resource.name, stage = %stage, error = %e, "Skipping resource");
                return StepOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        match self.drive(&stage, &job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    resource = %resource.name,
                    stage = %stage,
                    job = %job.name,
                    error = %e,
                    "Error handling step"
                );
                StepOutcome::Errored {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn drive(&self, stage: &Stage, job: &JobSpec) -> Result<StepOutcome> {
        let job_name = job.name.as_str();
        let resource = job.resource.as_str();
        let ensured = self.jobs.ensure(job).await?;
        debug!(job = job_name, outcome = ?ensured, "Ensured job");

        let outcome = match self.jobs.poll(job_name).await? {
            JobStatus::Succeeded => match pipeline::successor(stage) {
                Some(next) => {
                    info!(job = job_name, resource, next = %next, "Job succeeded, advancing");
                    self.status.advance(resource, next).await?;
                    StepOutcome::Advanced {
                        job: job_name.to_owned(),
                        to: next,
                    }
                }
                None => {
                    info!(job = job_name, resource, "Job succeeded, pipeline complete");
                    StepOutcome::Completed {
                        job: job_name.to_owned(),
                    }
                }
            },
            JobStatus::Failed => {
                warn!(
                    job = job_name,
                    resource, "Job failed, resource stays at {stage} until the job is remediated"
                );
                StepOutcome::Failed {
                    job: job_name.to_owned(),
                }
            }
            JobStatus::Running => {
                info!(job = job_name, resource, "Job is still running");
                StepOutcome::Running {
                    job: job_name.to_owned(),
                }
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::{InMemoryJobSubstrate, InMemoryResourceStore};
    use crate::types::{JobCounters, Step};

    fn setup(
        resource: Resource,
    ) -> (
        Reconciler,
        Arc<InMemoryResourceStore>,
        Arc<InMemoryJobSubstrate>,
    ) {
        let store = Arc::new(InMemoryResourceStore::new([resource]));
        let substrate = Arc::new(InMemoryJobSubstrate::new());
        let reconciler =
            Reconciler::with_backends(store.clone(), substrate.clone(), RetryPolicy::default());
        (reconciler, store, substrate)
    }

    #[tokio::test]
    async fn test_first_visit_creates_job_and_waits() {
        let resource = Resource::new("idx1")
            .with_indices("a", "b")
            .with_step(Step::Pending);
        let (reconciler, store, substrate) = setup(resource.clone());

        let outcome = reconciler.reconcile(&resource).await;

        assert_eq!(
            outcome,
            StepOutcome::Running {
                job: "pending-idx1".to_owned()
            }
        );
        assert_eq!(substrate.job_names().await, vec!["pending-idx1"]);
        assert_eq!(store.get("idx1").await, Some(resource));
    }

    #[tokio::test]
    async fn test_succeeded_job_advances_to_successor() {
        let resource = Resource::new("idx1")
            .with_indices("a", "b")
            .with_step(Step::EnableDw);
        let (reconciler, store, substrate) = setup(resource.clone());
        reconciler.reconcile(&resource).await;
        substrate
            .set_counters("enable-dw-idx1", JobCounters::succeeded())
            .await;

        let outcome = reconciler.reconcile(&resource).await;

        assert_eq!(
            outcome,
            StepOutcome::Advanced {
                job: "enable-dw-idx1".to_owned(),
                to: Step::Reindexing
            }
        );
        assert_eq!(
            store.get("idx1").await.and_then(|r| r.step),
            Some("REINDEXING".to_owned())
        );
    }

    #[tokio::test]
    async fn test_status_update_failure_is_contained() {
        let resource = Resource::new("idx1")
            .with_indices("a", "b")
            .with_step(Step::Pending);
        let (reconciler, store, substrate) = setup(resource.clone());
        reconciler.reconcile(&resource).await;
        substrate
            .set_counters("pending-idx1", JobCounters::succeeded())
            .await;
        store
            .fail_patches_of("idx1", Error::store_failed("patch", "conflict"))
            .await;

        let outcome = reconciler.reconcile(&resource).await;

        assert!(matches!(outcome, StepOutcome::Errored { .. }));
        assert_eq!(
            store.get("idx1").await.and_then(|r| r.step),
            Some("PENDING".to_owned())
        );
    }

    #[tokio::test]
    async fn test_missing_indices_skip_without_side_effects() {
        let resource = Resource::new("idx1").with_step(Step::Reindexing);
        let (reconciler, store, substrate) = setup(resource.clone());

        let outcome = reconciler.reconcile(&resource).await;

        assert!(matches!(outcome, StepOutcome::Skipped { .. }));
        assert_eq!(substrate.read_calls(), 0);
        assert_eq!(substrate.create_calls(), 0);
        assert_eq!(store.patch_calls(), 0);
    }
}
