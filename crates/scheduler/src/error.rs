// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use dv_core::JobRunType;
use thiserror::Error;

/// Reason given when a selected job name matches no instance of the stage.
pub const NO_JOB_FOUND: &str = "No job was found with this name.";

/// Reason given when the selected job has been removed from configuration.
pub const CONFIG_MISSING: &str = "Configuration for job doesn't exist.";

/// Errors raised while scheduling or rerunning. A failed call never leaves
/// a partial result behind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Stage '{stage}' not found in pipeline '{pipeline}'")]
    StageNotFound { pipeline: String, stage: String },

    #[error("Pipeline '{0}' has no stages")]
    EmptyPipeline(String),

    #[error("Could not find matching agents to run job [{job}] of stage [{stage}].")]
    NoMatchingAgents { job: String, stage: String },

    #[error("Cannot rerun job '{job_name}'. {information}")]
    CannotRerunJob { job_name: String, information: String },

    #[error("Cannot schedule multiple instances of job named '{0}'.")]
    MultipleInstances(String),

    #[error("No job was selected to re-run.")]
    NothingSelected,
}

impl ScheduleError {
    pub(crate) fn cannot_rerun(job_name: &str, information: impl Into<String>) -> Self {
        Self::CannotRerunJob { job_name: job_name.to_string(), information: information.into() }
    }

    pub(crate) fn run_type_changed(job_name: &str, now: JobRunType) -> Self {
        Self::cannot_rerun(
            job_name,
            format!("Run configuration for job has been changed to '{}'.", now.description()),
        )
    }

    /// Configured job name a rerun error refers to.
    pub fn job_name(&self) -> Option<&str> {
        match self {
            Self::CannotRerunJob { job_name, .. } => Some(job_name),
            Self::MultipleInstances(job) | Self::NoMatchingAgents { job, .. } => Some(job),
            _ => None,
        }
    }

    /// Human-readable reason a rerun was refused.
    pub fn information(&self) -> Option<&str> {
        match self {
            Self::CannotRerunJob { information, .. } => Some(information),
            _ => None,
        }
    }
}
