use async_trait::async_trait;
use kube::Client;
use kube::api::{Api, ListParams, Patch, PatchParams};
use reshard_reconciler::{Error, Resource, ResourceStore, Result, Step};
use serde_json::json;
use tracing::debug;

use super::{Resharding, api_code};

/// [`ResourceStore`] over the `Resharding` custom resource.
pub struct KubeResourceStore {
    api: Api<Resharding>,
}

impl KubeResourceStore {
    /// Store for reshardings in `namespace`.
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

/// Merge patch touching only the step.
fn step_patch(step: Step) -> serde_json::Value {
    json!({ "spec": { "status": step.as_str() } })
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn list(&self) -> Result<Vec<Resource>> {
        let list = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::store_failed("list", e.to_string()))?;
        debug!(count = list.items.len(), "Listed reshardings");
        Ok(list.items.iter().map(Resource::from).collect())
    }

    async fn patch_step(&self, name: &str, step: Step) -> Result<()> {
        let patch = step_patch(step);
        match self
            .api
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if api_code(&e) == Some(404) => Err(Error::resource_not_found(name)),
            Err(e) => Err(Error::store_failed("patch", e.to_string())),
        }
    }
}
