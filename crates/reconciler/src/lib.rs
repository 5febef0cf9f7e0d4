//! K8s-style reconciliation engine for index resharding.
//!
//! A resharding resource names a source and a target index and records which
//! step of the pipeline it has reached:
//!
//! ```text
//! PENDING → CREATING_INDEX → ENABLE_DW → REINDEXING → READ_SWAPPED → CLEANUP
//! ```
//!
//! Any other stored value is reset to `PENDING` through its own job.
//!
//! # Key Concepts
//!
//! ## Reconciliation
//!
//! The loop periodically:
//! 1. Lists every resharding resource
//! 2. Hands each one, concurrently, to the step handler for its stage
//! 3. The handler ensures the stage's job exists and polls it
//! 4. A succeeded job advances the resource to the next step
//!
//! The model is level-triggered: all state lives in the resources and the
//! jobs, so a restarted process simply picks up where the last one stopped.
//!
//! ## Capabilities
//!
//! - [`ResourceStore`] / [`StatusUpdater`] - list resources and patch their step
//! - [`JobSubstrate`] / [`JobOrchestrator`] - create and poll jobs
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reshard_reconciler::{
//!     InMemoryJobSubstrate, InMemoryResourceStore, LoopConfig, Reconciler,
//!     ReconciliationLoop, Resource, RetryPolicy, Step,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(InMemoryResourceStore::new([
//!         Resource::new("idx1").with_indices("a", "b").with_step(Step::Pending),
//!     ]));
//!     let substrate = Arc::new(InMemoryJobSubstrate::new());
//!     let reconciler = Arc::new(Reconciler::with_backends(
//!         store.clone(),
//!         substrate,
//!         RetryPolicy::default(),
//!     ));
//!
//!     let mut loop_runner = ReconciliationLoop::new(reconciler, store, LoopConfig::default());
//!     let _ = loop_runner.run().await;
//! }
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod r#loop;
pub mod memory;
pub mod orchestrator;
pub mod pipeline;
pub mod reconciler;
pub mod status;
pub mod types;

// Re-export main types
pub use error::{Error, Result};
pub use memory::{InMemoryJobSubstrate, InMemoryResourceStore, StoredJob};
pub use orchestrator::{JobOrchestrator, JobSubstrate, SubstrateOrchestrator};
pub use r#loop::{LoopConfig, LoopStopper, ReconciliationLoop};
pub use reconciler::Reconciler;
pub use status::{ResourceStore, StatusUpdater, StoreStatusUpdater};
pub use types::{
    EnsureOutcome, IterationReport, JobCounters, JobSpec, JobStatus, Resource, ResourceOutcome,
    RetryPolicy, Stage, Step, StepOutcome,
};
