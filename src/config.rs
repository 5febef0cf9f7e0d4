//! Command-line and environment configuration.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use reshard_reconciler::{Error, LoopConfig, Result, RetryPolicy};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Resharding operator
#[derive(Parser, Debug)]
#[command(name = "reshard-operator")]
#[command(version)]
#[command(about = "Drives index resharding resources through their job pipeline")]
pub struct Cli {
    /// Namespace holding the resharding resources and their jobs
    #[arg(long, env = "RESHARD_NAMESPACE", default_value = "es-config")]
    pub namespace: String,

    /// Seconds to wait between reconciliation iterations
    #[arg(long, env = "RESHARD_INTERVAL_SECS", default_value_t = 10)]
    pub interval_secs: u64,

    /// Container image used for pipeline jobs
    #[arg(long, env = "RESHARD_JOB_IMAGE", default_value = "busybox:latest")]
    pub job_image: String,

    /// Retries a job gets before it is marked failed
    #[arg(long, env = "RESHARD_BACKOFF_LIMIT", default_value_t = 3)]
    pub backoff_limit: u32,

    /// Log output format
    #[arg(long, env = "RESHARD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Validated operator configuration.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub namespace: String,
    pub job_image: String,
    pub retry: RetryPolicy,
    pub loop_config: LoopConfig,
}

impl TryFrom<Cli> for OperatorConfig {
    type Error = Error;

    fn try_from(cli: Cli) -> Result<Self> {
        if cli.namespace.trim().is_empty() {
            return Err(Error::invalid_config("namespace must not be empty"));
        }
        if cli.job_image.trim().is_empty() {
            return Err(Error::invalid_config("job image must not be empty"));
        }
        Ok(Self {
            namespace: cli.namespace,
            job_image: cli.job_image,
            retry: RetryPolicy {
                backoff_limit: cli.backoff_limit,
            },
            loop_config: LoopConfig::new(Duration::from_secs(cli.interval_secs))?,
        })
    }
}
