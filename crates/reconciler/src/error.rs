//! Error types for the reconciler crate.
//!
//! Two conditions are benign and classified separately: a job that does not
//! exist yet (triggers creation) and a job that already exists (lost a
//! creation race). Everything else is surfaced to the step handler.

use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The resharding resource does not exist in the store.
    #[error("resharding '{name}' not found")]
    ResourceNotFound { name: String },

    /// No execution unit with this name exists.
    #[error("job '{name}' not found")]
    JobNotFound { name: String },

    /// An execution unit with this name already exists.
    #[error("job '{name}' already exists")]
    JobAlreadyExists { name: String },

    /// The resource lacks attributes its current step needs.
    #[error("resharding '{name}' is missing {missing}")]
    MissingAttributes { name: String, missing: String },

    /// The resource store rejected or failed an operation.
    #[error("resource store error during {operation}: {reason}")]
    StoreFailed { operation: String, reason: String },

    /// The job substrate rejected or failed an operation.
    #[error("job substrate error during {operation}: {reason}")]
    SubstrateFailed { operation: String, reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a resource not found error.
    pub fn resource_not_found(name: impl Into<String>) -> Self {
        Self::ResourceNotFound { name: name.into() }
    }

    /// Create a job not found error.
    pub fn job_not_found(name: impl Into<String>) -> Self {
        Self::JobNotFound { name: name.into() }
    }

    /// Create a job already exists error.
    pub fn job_already_exists(name: impl Into<String>) -> Self {
        Self::JobAlreadyExists { name: name.into() }
    }

    /// Create a missing attributes error.
    pub fn missing_attributes(name: impl Into<String>, missing: impl Into<String>) -> Self {
        Self::MissingAttributes {
            name: name.into(),
            missing: missing.into(),
        }
    }

    /// Create a resource store error.
    pub fn store_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StoreFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a job substrate error.
    pub fn substrate_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubstrateFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether this is the "job does not exist" condition.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound { .. })
    }

    /// Whether this is the "job already exists" condition.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::JobAlreadyExists { .. })
    }
}
