//! Core types for the reconciler.

use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A step of the resharding pipeline, in pipeline order.
///
/// Ordering follows the pipeline, so `Step::Pending < Step::Cleanup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    Pending,
    CreatingIndex,
    EnableDw,
    Reindexing,
    ReadSwapped,
    Cleanup,
}

impl Step {
    /// All steps in pipeline order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::CreatingIndex,
        Self::EnableDw,
        Self::Reindexing,
        Self::ReadSwapped,
        Self::Cleanup,
    ];

    /// The value stored on the resource for this step.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::CreatingIndex => "CREATING_INDEX",
            Self::EnableDw => "ENABLE_DW",
            Self::Reindexing => "REINDEXING",
            Self::ReadSwapped => "READ_SWAPPED",
            Self::Cleanup => "CLEANUP",
        }
    }

    /// Parse a stored step value. Unrecognized values yield `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.as_str() == value)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a resource currently sits, as seen by the step handlers.
///
/// Every stored value maps to exactly one stage: a known [`Step`], or the
/// unrecognized catch-all (which also covers an absent value).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stage {
    /// A recognized pipeline step.
    Step(Step),
    /// Absent or unrecognized stored value, kept verbatim.
    Unrecognized(Option<String>),
}

impl Stage {
    /// Classify a raw stored step value.
    #[must_use]
    pub fn of(raw: Option<&str>) -> Self {
        match raw.and_then(Step::parse) {
            Some(step) => Self::Step(step),
            None => Self::Unrecognized(raw.map(str::to_owned)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step(step) => step.fmt(f),
            Self::Unrecognized(Some(raw)) => write!(f, "UNKNOWN({raw})"),
            Self::Unrecognized(None) => f.write_str("UNKNOWN(<absent>)"),
        }
    }
}

/// A resharding resource as listed from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique resource name.
    pub name: String,
    /// Index being migrated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_index: Option<String>,
    /// Index being migrated to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_index: Option<String>,
    /// Raw stored step value, possibly absent or unrecognized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

impl Resource {
    /// Create a resource with no indices and no step.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_index: None,
            target_index: None,
            step: None,
        }
    }

    /// Set both indices.
    #[must_use]
    pub fn with_indices(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source_index = Some(source.into());
        self.target_index = Some(target.into());
        self
    }

    /// Set the step to a known pipeline step.
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.step = Some(step.as_str().to_owned());
        self
    }

    /// Set the raw step value verbatim.
    #[must_use]
    pub fn with_raw_step(mut self, raw: impl Into<String>) -> Self {
        self.step = Some(raw.into());
        self
    }

    /// The stage this resource is in.
    #[must_use]
    pub fn stage(&self) -> Stage {
        Stage::of(self.step.as_deref())
    }

    /// Both indices, if present and non-empty.
    #[must_use]
    pub fn indices(&self) -> Option<(&str, &str)> {
        let source = self.source_index.as_deref().filter(|s| !s.is_empty())?;
        let target = self.target_index.as_deref().filter(|s| !s.is_empty())?;
        Some((source, target))
    }
}

/// Bounded retry policy handed to the job substrate on creation.
///
/// Jobs never restart in place; the substrate retries by running a fresh
/// attempt, at most `backoff_limit` times before reporting failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retries before the job is permanently failed.
    pub backoff_limit: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { backoff_limit: 3 }
    }
}

/// Description of the execution unit for one (resource, stage) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Deterministic job name, `<label>-<resource>`.
    pub name: String,
    /// Name of the owning resharding resource.
    pub resource: String,
    /// Step label, e.g. `creating-index`.
    pub label: String,
    /// Opaque shell command run by the job.
    pub command: String,
    /// Environment passed to the job.
    pub env: BTreeMap<String, String>,
}

impl JobSpec {
    /// Labels attached to the job for lookup by operators.
    #[must_use]
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("resharding-name".to_owned(), self.resource.clone()),
            ("step".to_owned(), self.label.clone()),
        ])
    }
}

/// Completion counters reported by the job substrate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    /// Pods currently running.
    pub active: u32,
    /// Pods that completed successfully.
    pub succeeded: u32,
    /// Pods that failed.
    pub failed: u32,
}

impl JobCounters {
    /// Counters for a job that has succeeded.
    #[must_use]
    pub const fn succeeded() -> Self {
        Self {
            active: 0,
            succeeded: 1,
            failed: 0,
        }
    }

    /// Counters for a job that has failed.
    #[must_use]
    pub const fn failed() -> Self {
        Self {
            active: 0,
            succeeded: 0,
            failed: 1,
        }
    }

    /// Counters for a job still in progress.
    #[must_use]
    pub const fn running() -> Self {
        Self {
            active: 1,
            succeeded: 0,
            failed: 0,
        }
    }
}

/// Terminal status of an execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// Map completion counters to a status. Success wins over failure.
    #[must_use]
    pub const fn from_counters(counters: JobCounters) -> Self {
        if counters.succeeded > 0 {
            Self::Succeeded
        } else if counters.failed > 0 {
            Self::Failed
        } else {
            Self::Running
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Whether `ensure` had to create the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The job was created by this call.
    Created,
    /// The job was already there.
    Existing,
}

/// What a step handler did for one resource in one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Preconditions not met; nothing was touched.
    Skipped { reason: String },
    /// The job is still running.
    Running { job: String },
    /// The job failed; the resource stays pinned.
    Failed { job: String },
    /// The job succeeded and the step moved forward.
    Advanced { job: String, to: Step },
    /// The terminal job succeeded; nothing further to do.
    Completed { job: String },
    /// Ensuring, polling or advancing failed; retried next iteration.
    Errored { reason: String },
}

impl StepOutcome {
    /// Short label for logs and summaries.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Skipped { .. } => "skipped",
            Self::Running { .. } => "running",
            Self::Failed { .. } => "failed",
            Self::Advanced { .. } => "advanced",
            Self::Completed { .. } => "completed",
            Self::Errored { .. } => "errored",
        }
    }
}

/// Outcome for one resource within an iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    /// Resource name.
    pub resource: String,
    /// Stage the resource was in when handled.
    pub stage: Stage,
    /// What the handler did.
    pub outcome: StepOutcome,
}

/// Result of one reconciliation iteration.
#[derive(Debug, Clone, Default)]
pub struct IterationReport {
    /// Number of resources listed.
    pub listed: usize,
    /// Per-resource outcomes, in completion order.
    pub outcomes: Vec<ResourceOutcome>,
    /// Set when listing failed and the iteration was skipped.
    pub list_error: Option<String>,
}

impl IterationReport {
    /// Report for an iteration whose listing failed.
    pub fn list_failed(reason: impl Into<String>) -> Self {
        Self {
            list_error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Outcome recorded for a resource, if it was handled.
    #[must_use]
    pub fn outcome_for(&self, resource: &str) -> Option<&StepOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.resource == resource)
            .map(|o| &o.outcome)
    }

    /// Number of resources whose handler errored.
    #[must_use]
    pub fn errored_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, StepOutcome::Errored { .. }))
            .count()
    }

    /// Number of resources that moved to a new step.
    #[must_use]
    pub fn advanced_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, StepOutcome::Advanced { .. }))
            .count()
    }

    /// Every listed resource has finished its terminal step.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.list_error.is_none()
            && self
                .outcomes
                .iter()
                .all(|o| matches!(o.outcome, StepOutcome::Completed { .. }))
    }

    /// Outcome counts keyed by kind, for the iteration summary log line.
    #[must_use]
    pub fn summary(&self) -> String {
        self.outcomes
            .iter()
            .map(|o| o.outcome.kind())
            .counts()
            .into_iter()
            .sorted()
            .map(|(kind, n)| format!("{kind}={n}"))
            .join(" ")
    }
}
