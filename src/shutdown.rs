//! Termination signal handling.
//!
//! SIGTERM/SIGINT are logged and turned into a loop stop request. The
//! iteration in progress is allowed to finish; everything the loop does is
//! safe to resume from a fresh process anyway.

use std::fmt;

use reshard_reconciler::LoopStopper;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM signal received
    Sigterm,
    /// SIGINT signal received (Ctrl+C)
    Sigint,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sigterm => write!(f, "SIGTERM"),
            Self::Sigint => write!(f, "SIGINT"),
        }
    }
}

/// Wait for the first termination signal.
///
/// # Errors
///
/// Returns the I/O error if a signal handler cannot be installed.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => Ok(ShutdownSignal::Sigterm),
        _ = sigint.recv() => Ok(ShutdownSignal::Sigint),
    }
}

/// Wait for the first termination signal.
///
/// # Errors
///
/// Returns the I/O error if the Ctrl+C handler cannot be installed.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::Sigint)
}

/// Install OS signal handlers that stop the loop on SIGTERM/SIGINT.
pub fn spawn_signal_watcher(stopper: LoopStopper) -> JoinHandle<()> {
    info!("Installing OS signal handlers");

    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                info!(signal = %signal, "Received {signal}, shutting down gracefully");
                stopper.stop();
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handlers");
            }
        }
    })
}
