//! In-memory resource store and job substrate.
//!
//! Both keep call counters and accept scripted failures so the state machine
//! and loop can be driven without a cluster.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::orchestrator::JobSubstrate;
use crate::status::ResourceStore;
use crate::types::{JobCounters, JobSpec, Resource, RetryPolicy, Step};

/// Simple in-memory resource store.
#[derive(Default)]
pub struct InMemoryResourceStore {
    resources: RwLock<BTreeMap<String, Resource>>,
    list_failure: RwLock<Option<Error>>,
    patch_failures: RwLock<HashMap<String, Error>>,
    list_calls: AtomicUsize,
    patch_calls: AtomicUsize,
}

impl InMemoryResourceStore {
    /// Create a store holding `resources`.
    pub fn new(resources: impl IntoIterator<Item = Resource>) -> Self {
        let resources = resources
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();
        Self {
            resources: RwLock::new(resources),
            ..Self::default()
        }
    }

    /// Add or replace a resource.
    pub async fn insert(&self, resource: Resource) {
        self.resources
            .write()
            .await
            .insert(resource.name.clone(), resource);
    }

    /// Remove a resource, as an operator deleting it would.
    pub async fn remove(&self, name: &str) -> Option<Resource> {
        self.resources.write().await.remove(name)
    }

    /// Current copy of a resource.
    pub async fn get(&self, name: &str) -> Option<Resource> {
        self.resources.read().await.get(name).cloned()
    }

    /// Make every `list` fail with `error` until cleared with `None`.
    pub async fn fail_list(&self, error: Option<Error>) {
        *self.list_failure.write().await = error;
    }

    /// Make every `patch_step` of `name` fail with `error`.
    pub async fn fail_patches_of(&self, name: &str, error: Error) {
        self.patch_failures
            .write()
            .await
            .insert(name.to_owned(), error);
    }

    /// Stop failing patches of `name`.
    pub async fn heal_patches_of(&self, name: &str) {
        self.patch_failures.write().await.remove(name);
    }

    /// Number of `list` calls so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `patch_step` calls so far, including failed ones.
    pub fn patch_calls(&self) -> usize {
        self.patch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn list(&self) -> Result<Vec<Resource>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.list_failure.read().await.clone() {
            return Err(e);
        }
        Ok(self.resources.read().await.values().cloned().collect())
    }

    async fn patch_step(&self, name: &str, step: Step) -> Result<()> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.patch_failures.read().await.get(name).cloned() {
            return Err(e);
        }
        let mut resources = self.resources.write().await;
        let resource = resources
            .get_mut(name)
            .ok_or_else(|| Error::resource_not_found(name))?;
        resource.step = Some(step.as_str().to_owned());
        Ok(())
    }
}

/// A job held by [`InMemoryJobSubstrate`].
#[derive(Debug, Clone)]
pub struct StoredJob {
    /// The job as created.
    pub spec: JobSpec,
    /// Retry policy it was created with.
    pub policy: RetryPolicy,
    /// Current completion counters.
    pub counters: JobCounters,
}

/// Simple in-memory job substrate.
///
/// Jobs never progress on their own: new jobs start with the configured
/// initial counters (running by default) and move only via
/// [`InMemoryJobSubstrate::set_counters`].
pub struct InMemoryJobSubstrate {
    jobs: RwLock<BTreeMap<String, StoredJob>>,
    initial_counters: JobCounters,
    read_failures: RwLock<HashMap<String, Error>>,
    create_failures: RwLock<HashMap<String, Error>>,
    read_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl InMemoryJobSubstrate {
    /// Create an empty substrate whose jobs start out running.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(BTreeMap::new()),
            initial_counters: JobCounters::running(),
            read_failures: RwLock::new(HashMap::new()),
            create_failures: RwLock::new(HashMap::new()),
            read_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Give newly created jobs these counters instead.
    #[must_use]
    pub fn with_initial_counters(mut self, counters: JobCounters) -> Self {
        self.initial_counters = counters;
        self
    }

    /// Set the counters of an existing job. Returns false if it does not exist.
    pub async fn set_counters(&self, name: &str, counters: JobCounters) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(name) else {
            return false;
        };
        job.counters = counters;
        true
    }

    /// Make every `read` of `name` fail with `error`.
    pub async fn fail_reads_of(&self, name: &str, error: Error) {
        self.read_failures
            .write()
            .await
            .insert(name.to_owned(), error);
    }

    /// Make every `create` of `name` fail with `error`.
    pub async fn fail_creates_of(&self, name: &str, error: Error) {
        self.create_failures
            .write()
            .await
            .insert(name.to_owned(), error);
    }

    /// Drop all scripted failures.
    pub async fn clear_failures(&self) {
        self.read_failures.write().await.clear();
        self.create_failures.write().await.clear();
    }

    /// A created job, if any.
    pub async fn job(&self, name: &str) -> Option<StoredJob> {
        self.jobs.read().await.get(name).cloned()
    }

    /// Retry policy a job was created with.
    pub async fn policy_of(&self, name: &str) -> Option<RetryPolicy> {
        self.jobs.read().await.get(name).map(|job| job.policy)
    }

    /// Names of all created jobs, sorted.
    pub async fn job_names(&self) -> Vec<String> {
        self.jobs.read().await.keys().cloned().collect()
    }

    /// Number of `read` calls so far.
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Number of `create` calls so far, including failed ones.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryJobSubstrate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobSubstrate for InMemoryJobSubstrate {
    async fn read(&self, name: &str) -> Result<JobCounters> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.read_failures.read().await.get(name).cloned() {
            return Err(e);
        }
        self.jobs
            .read()
            .await
            .get(name)
            .map(|job| job.counters)
            .ok_or_else(|| Error::job_not_found(name))
    }

    async fn create(&self, job: &JobSpec, policy: RetryPolicy) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.create_failures.read().await.get(&job.name).cloned() {
            return Err(e);
        }
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.name) {
            return Err(Error::job_already_exists(&job.name));
        }
        jobs.insert(
            job.name.clone(),
            StoredJob {
                spec: job.clone(),
                policy,
                counters: self.initial_counters,
            },
        );
        Ok(())
    }
}
