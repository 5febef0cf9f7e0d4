//! # Resharding operator
//!
//! ## Initialization Sequence
//!
//! 1. **Configuration** - Parse flags and environment, validate them
//! 2. **Kubernetes Client** - Infer from kubeconfig or the in-cluster account
//! 3. **Reconciler** - Wire the resharding store and the job substrate
//! 4. **Signal Watcher** - Stop the loop on SIGTERM/SIGINT
//! 5. **Reconciliation Loop** - Run until stopped
//!
//! Any failure before the loop starts exits non-zero with the error chain.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use reshard_operator::config::{Cli, LogFormat, OperatorConfig};
use reshard_operator::k8s::{KubeJobSubstrate, KubeResourceStore};
use reshard_operator::shutdown;
use reshard_reconciler::{Reconciler, ReconciliationLoop};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = OperatorConfig::try_from(cli).context("Invalid configuration")?;
    info!(
        namespace = %config.namespace,
        interval_secs = config.loop_config.interval.as_secs(),
        image = %config.job_image,
        backoff_limit = config.retry.backoff_limit,
        "Resharding operator starting"
    );

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let store = Arc::new(KubeResourceStore::new(client.clone(), &config.namespace));
    let substrate = Arc::new(KubeJobSubstrate::new(
        client,
        &config.namespace,
        config.job_image.clone(),
    ));
    let reconciler = Arc::new(Reconciler::with_backends(
        store.clone(),
        substrate,
        config.retry,
    ));

    let mut reconciliation = ReconciliationLoop::new(reconciler, store, config.loop_config);
    let _signals = shutdown::spawn_signal_watcher(reconciliation.stopper());

    reconciliation
        .run()
        .await
        .context("Reconciliation loop failed")?;

    info!("Resharding operator stopped");
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` overrides the default `info` filter.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
