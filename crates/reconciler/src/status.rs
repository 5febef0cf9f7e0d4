//! Resource store access and step advancement.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::types::{Resource, Step};

/// Store holding the declarative resharding resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// List every resource.
    async fn list(&self) -> Result<Vec<Resource>>;

    /// Merge-patch the step of one resource, leaving every other field as is.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::ResourceNotFound`] when the resource is gone.
    async fn patch_step(&self, name: &str, step: Step) -> Result<()>;
}

/// Narrow status capability used by the step handlers.
#[async_trait]
pub trait StatusUpdater: Send + Sync {
    /// Move the named resource to `step`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::ResourceNotFound`] when the resource is gone,
    /// or with the store's error when the write fails.
    async fn advance(&self, name: &str, step: Step) -> Result<()>;
}

/// [`StatusUpdater`] backed by a [`ResourceStore`].
pub struct StoreStatusUpdater {
    store: Arc<dyn ResourceStore>,
}

impl StoreStatusUpdater {
    /// Create an updater writing through `store`.
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StatusUpdater for StoreStatusUpdater {
    async fn advance(&self, name: &str, step: Step) -> Result<()> {
        self.store.patch_step(name, step).await?;
        info!(resource = name, step = %step, "Set step");
        Ok(())
    }
}
