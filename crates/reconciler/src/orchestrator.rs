//! Job orchestration: at most one execution unit per (resource, step).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::Result;
use crate::types::{EnsureOutcome, JobCounters, JobSpec, JobStatus, RetryPolicy};

/// The execution substrate jobs run on.
#[async_trait]
pub trait JobSubstrate: Send + Sync {
    /// Read a job's completion counters.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::JobNotFound`] when no job has this name.
    async fn read(&self, name: &str) -> Result<JobCounters>;

    /// Create a job that never restarts in place and retries at most
    /// `policy.backoff_limit` times.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::JobAlreadyExists`] on a name collision.
    async fn create(&self, job: &JobSpec, policy: RetryPolicy) -> Result<()>;
}

/// Narrow job capability used by the step handlers.
#[async_trait]
pub trait JobOrchestrator: Send + Sync {
    /// Make sure the job exists, creating it if it does not.
    ///
    /// # Errors
    ///
    /// Fails when the job cannot be read for a reason other than not existing,
    /// or when creating it fails for a reason other than a name collision.
    async fn ensure(&self, job: &JobSpec) -> Result<EnsureOutcome>;

    /// Current status of the named job.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::JobNotFound`] when no job has this name, or
    /// with the substrate's error when the read fails.
    async fn poll(&self, name: &str) -> Result<JobStatus>;
}

/// [`JobOrchestrator`] backed by a [`JobSubstrate`].
pub struct SubstrateOrchestrator {
    substrate: Arc<dyn JobSubstrate>,
    policy: RetryPolicy,
}

impl SubstrateOrchestrator {
    /// Create an orchestrator with the default retry policy.
    pub fn new(substrate: Arc<dyn JobSubstrate>) -> Self {
        Self {
            substrate,
            policy: RetryPolicy::default(),
        }
    }

    /// Override the retry policy given to newly created jobs.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl JobOrchestrator for SubstrateOrchestrator {
    async fn ensure(&self, job: &JobSpec) -> Result<EnsureOutcome> {
        match self.substrate.read(&job.name).await {
            Ok(_) => {
                debug!(job = %job.name, resource = %job.resource, "Job already exists");
                Ok(EnsureOutcome::Existing)
            }
            Err(e) if e.is_not_found() => {
                info!(
                    job = %job.name,
                    resource = %job.resource,
                    step = %job.label,
                    backoff_limit = self.policy.backoff_limit,
                    "Creating job"
                );
                match self.substrate.create(job, self.policy).await {
                    Ok(()) => Ok(EnsureOutcome::Created),
                    // Someone created it between our read and create.
                    Err(e) if e.is_already_exists() => {
                        debug!(job = %job.name, "Job appeared concurrently");
                        Ok(EnsureOutcome::Existing)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn poll(&self, name: &str) -> Result<JobStatus> {
        let counters = self.substrate.read(name).await?;
        let status = JobStatus::from_counters(counters);
        debug!(
            job = name,
            active = counters.active,
            succeeded = counters.succeeded,
            failed = counters.failed,
            status = %status,
            "Polled job"
        );
        Ok(status)
    }
}
