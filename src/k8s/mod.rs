//! Kubernetes-backed resource store and job substrate.
//!
//! Reshardings are the `front.search.com/v1` custom resource; the pipeline
//! step lives in `spec.status`. Jobs are plain `batch/v1` Jobs in the same
//! namespace.

mod jobs;
mod store;

use kube::CustomResource;
use kube::ResourceExt;
use reshard_reconciler::Resource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use jobs::{KubeJobSubstrate, build_job, counters_of};
pub use store::KubeResourceStore;

/// Spec of a `Resharding` custom resource.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "front.search.com",
    version = "v1",
    kind = "Resharding",
    plural = "reshardings",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ReshardingSpec {
    /// Index being migrated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_index: Option<String>,
    /// Index being migrated to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_index: Option<String>,
    /// Current pipeline step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl From<&Resharding> for Resource {
    fn from(resharding: &Resharding) -> Self {
        Self {
            name: resharding.name_any(),
            source_index: resharding.spec.source_index.clone(),
            target_index: resharding.spec.target_index.clone(),
            step: resharding.spec.status.clone(),
        }
    }
}

/// HTTP status code of an API error, if the error came from the API server.
fn api_code(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}
