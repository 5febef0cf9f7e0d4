use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec as KubeJobSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Client;
use kube::api::{Api, PostParams};
use reshard_reconciler::{Error, JobCounters, JobSpec, JobSubstrate, Result, RetryPolicy};
use tracing::info;

use super::api_code;

/// [`JobSubstrate`] running pipeline steps as `batch/v1` Jobs.
pub struct KubeJobSubstrate {
    api: Api<Job>,
    image: String,
}

impl KubeJobSubstrate {
    /// Substrate creating jobs in `namespace` that run `image`.
    pub fn new(client: Client, namespace: &str, image: impl Into<String>) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            image: image.into(),
        }
    }
}

/// Completion counters of a Job. Missing or negative counts read as zero.
#[must_use]
pub fn counters_of(job: &Job) -> JobCounters {
    let count = |value: Option<i32>| value.and_then(|v| u32::try_from(v).ok()).unwrap_or(0);
    job.status
        .as_ref()
        .map(|status| JobCounters {
            active: count(status.active),
            succeeded: count(status.succeeded),
            failed: count(status.failed),
        })
        .unwrap_or_default()
}

/// The Job object for a pipeline step.
///
/// One container named `<label>-worker` runs the step's command through
/// `/bin/sh -c`. The pod never restarts in place; the Job controller retries
/// at most `policy.backoff_limit` times.
#[must_use]
pub fn build_job(job: &JobSpec, policy: RetryPolicy, image: &str) -> Job {
    let env = job
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: Some(value.clone()),
            ..EnvVar::default()
        })
        .collect();

    let container = Container {
        name: format!("{}-worker", job.label),
        image: Some(image.to_owned()),
        command: Some(vec!["/bin/sh".to_owned()]),
        args: Some(vec!["-c".to_owned(), job.command.clone()]),
        env: Some(env),
        ..Container::default()
    };

    Job {
        metadata: ObjectMeta {
            name: Some(job.name.clone()),
            labels: Some(job.labels()),
            ..ObjectMeta::default()
        },
        spec: Some(KubeJobSpec {
            backoff_limit: Some(i32::try_from(policy.backoff_limit).unwrap_or(i32::MAX)),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![container],
                    restart_policy: Some("Never".to_owned()),
                    ..PodSpec::default()
                }),
            },
            ..KubeJobSpec::default()
        }),
        ..Job::default()
    }
}

#[async_trait]
impl JobSubstrate for KubeJobSubstrate {
    async fn read(&self, name: &str) -> Result<JobCounters> {
        match self.api.get(name).await {
            Ok(job) => Ok(counters_of(&job)),
            Err(e) if api_code(&e) == Some(404) => Err(Error::job_not_found(name)),
            Err(e) => Err(Error::substrate_failed("read", e.to_string())),
        }
    }

    async fn create(&self, job: &JobSpec, policy: RetryPolicy) -> Result<()> {
        let object = build_job(job, policy, &self.image);
        match self.api.create(&PostParams::default(), &object).await {
            Ok(_) => {
                info!(job = %job.name, resource = %job.resource, step = %job.label, "Created job");
                Ok(())
            }
            Err(e) if api_code(&e) == Some(409) => Err(Error::job_already_exists(&job.name)),
            Err(e) => Err(Error::substrate_failed("create", e.to_string())),
        }
    }
}
