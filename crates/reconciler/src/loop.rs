//! Continuous reconciliation loop.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::reconciler::Reconciler;
use crate::status::ResourceStore;
use crate::types::{IterationReport, ResourceOutcome, Stage, StepOutcome};

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Delay between the end of one iteration and the start of the next.
    pub interval: Duration,
}

impl LoopConfig {
    /// Create a config with the given interval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for a zero interval.
    pub fn new(interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::invalid_config("loop interval must be non-zero"));
        }
        Ok(Self { interval })
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
        }
    }
}

/// Continuous reconciliation loop.
///
/// Each iteration lists every resource and hands each one to the
/// [`Reconciler`] in its own task. Iterations never overlap, and nothing
/// is carried from one iteration to the next.
pub struct ReconciliationLoop {
    /// The step handlers.
    reconciler: Arc<Reconciler>,
    /// Where resources are listed from.
    store: Arc<dyn ResourceStore>,
    /// Loop configuration.
    config: LoopConfig,
    /// Stop signal receiver.
    stop_rx: watch::Receiver<bool>,
    /// Stop signal sender (for external control).
    stop_tx: watch::Sender<bool>,
}

impl ReconciliationLoop {
    /// Create a new reconciliation loop.
    pub fn new(
        reconciler: Arc<Reconciler>,
        store: Arc<dyn ResourceStore>,
        config: LoopConfig,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            reconciler,
            store,
            config,
            stop_rx,
            stop_tx,
        }
    }

    /// Run the reconciliation loop until stopped.
    ///
    /// A stop request is honoured between iterations; an iteration in
    /// progress always runs to completion.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            interval_ms = self.config.interval.as_millis(),
            "Starting reconciliation loop"
        );

        let mut iteration = 0u64;
        loop {
            if *self.stop_rx.borrow() {
                break;
            }

            iteration = iteration.wrapping_add(1);
            let report = self.reconcile_once().await;
            if report.list_error.is_none() {
                info!(
                    iteration,
                    listed = report.listed,
                    outcomes = %report.summary(),
                    "Reconciliation iteration complete"
                );
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.interval) => {}
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reconciliation loop stopped");
        Ok(())
    }

    /// Run a single reconciliation iteration.
    ///
    /// Never fails: a listing error is logged and recorded in the report,
    /// and each resource's failure stays confined to its own outcome.
    pub async fn reconcile_once(&self) -> IterationReport {
        let resources = match self.store.list().await {
            Ok(resources) => resources,
            Err(e) => {
                error!(error = %e, "Failed to list reshardings");
                return IterationReport::list_failed(e.to_string());
            }
        };
        debug!(count = resources.len(), "Listed reshardings");

        let (keys, handles): (Vec<(String, Stage)>, Vec<JoinHandle<StepOutcome>>) = resources
            .into_iter()
            .map(|resource| {
                let reconciler = Arc::clone(&self.reconciler);
                let key = (resource.name.clone(), resource.stage());
                let handle = tokio::spawn(async move { reconciler.reconcile(&resource).await });
                (key, handle)
            })
            .unzip();

        let listed = keys.len();
        let outcomes: Vec<ResourceOutcome> = keys
            .into_iter()
            .zip(join_all(handles).await)
            .map(|((resource, stage), joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    error!(resource = %resource, error = %e, "Step handler task aborted");
                    StepOutcome::Errored {
                        reason: format!("handler task aborted: {e}"),
                    }
                });
                ResourceOutcome {
                    resource,
                    stage,
                    outcome,
                }
            })
            .collect();

        IterationReport {
            listed,
            outcomes,
            list_error: None,
        }
    }

    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

/// Handle to stop a reconciliation loop.
#[derive(Clone)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}
