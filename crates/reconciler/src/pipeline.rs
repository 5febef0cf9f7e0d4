//! The resharding pipeline table.
//!
//! For every stage this names the job to run and the step a resource moves
//! to once that job succeeds. The match in [`successor`] and [`job_for`] is
//! exhaustive over [`Stage`], so a new step cannot go unhandled.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{JobSpec, Resource, Stage, Step};

/// Step a resource moves to when the job for `stage` succeeds.
///
/// `None` means `stage` is terminal.
#[must_use]
pub const fn successor(stage: &Stage) -> Option<Step> {
    match stage {
        Stage::Step(Step::Pending) => Some(Step::CreatingIndex),
        Stage::Step(Step::CreatingIndex) => Some(Step::EnableDw),
        Stage::Step(Step::EnableDw) => Some(Step::Reindexing),
        Stage::Step(Step::Reindexing) => Some(Step::ReadSwapped),
        Stage::Step(Step::ReadSwapped) => Some(Step::Cleanup),
        Stage::Step(Step::Cleanup) => None,
        Stage::Unrecognized(_) => Some(Step::Pending),
    }
}

/// Job label for a stage; also the prefix of the job name.
#[must_use]
pub const fn label(stage: &Stage) -> &'static str {
    match stage {
        Stage::Step(Step::Pending) => "pending",
        Stage::Step(Step::CreatingIndex) => "creating-index",
        Stage::Step(Step::EnableDw) => "enable-dw",
        Stage::Step(Step::Reindexing) => "reindexing",
        Stage::Step(Step::ReadSwapped) => "read-swapped",
        Stage::Step(Step::Cleanup) => "cleanup",
        Stage::Unrecognized(_) => "unknown-status",
    }
}

/// Deterministic job name for a (resource, stage) pair.
#[must_use]
pub fn job_name(stage: &Stage, resource: &str) -> String {
    format!("{}-{resource}", label(stage))
}

/// Build the job for `resource` in `stage`.
///
/// # Errors
///
/// Returns [`Error::MissingAttributes`] when a data step is missing
/// `sourceIndex` or `targetIndex`. The reset step needs neither.
pub fn job_for(stage: &Stage, resource: &Resource) -> Result<JobSpec> {
    let command_and_env = match stage {
        Stage::Step(step) => {
            let (source, target) = resource.indices().ok_or_else(|| {
                Error::missing_attributes(&resource.name, "sourceIndex or targetIndex")
            })?;
            (
                data_step_command(*step, source, target),
                BTreeMap::from([
                    ("SOURCE_INDEX".to_owned(), source.to_owned()),
                    ("TARGET_INDEX".to_owned(), target.to_owned()),
                ]),
            )
        }
        Stage::Unrecognized(raw) => {
            let current = raw.as_deref().unwrap_or_default();
            (
                format!(
                    "echo \"Handling unknown status: {current} for {name}\" && sleep 5 && echo \"Reset to PENDING\"",
                    name = resource.name
                ),
                BTreeMap::from([
                    ("CURRENT_STEP".to_owned(), current.to_owned()),
                    ("RESHARDING_NAME".to_owned(), resource.name.clone()),
                ]),
            )
        }
    };
    let (command, env) = command_and_env;

    Ok(JobSpec {
        name: job_name(stage, &resource.name),
        resource: resource.name.clone(),
        label: label(stage).to_owned(),
        command,
        env,
    })
}

fn data_step_command(step: Step, source: &str, target: &str) -> String {
    match step {
        Step::Pending => format!(
            "echo \"Preparing resharding from {source} to {target}\" && sleep 10 && echo \"Resharding prepared\""
        ),
        Step::CreatingIndex => format!(
            "echo \"Creating index {target} from {source}\" && sleep 15 && echo \"Index creation completed\""
        ),
        Step::EnableDw => format!(
            "echo \"Enabling data write for {target}\" && sleep 12 && echo \"Data write enabled\""
        ),
        Step::Reindexing => format!(
            "echo \"Reindexing from {source} to {target}\" && sleep 20 && echo \"Reindexing completed\""
        ),
        Step::ReadSwapped => format!(
            "echo \"Swapping read operations from {source} to {target}\" && sleep 8 && echo \"Read operations swapped\""
        ),
        Step::Cleanup => format!(
            "echo \"Cleaning up old index {source}\" && sleep 10 && echo \"Cleanup completed\""
        ),
    }
}
