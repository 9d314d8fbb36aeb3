// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage and pipeline run records.

use crate::config::ApprovalType;
use crate::env_vars::EnvironmentVariables;
use crate::job::{JobInstance, JobResult, UNPERSISTED_ID};
use serde::{Deserialize, Serialize};

/// Approver recorded for automatically triggered runs.
pub const DEFAULT_APPROVER: &str = "changes";

/// Aggregate result of a stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageResult {
    Unknown,
    Passed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    StageResult {
        Unknown => "Unknown",
        Passed => "Passed",
        Failed => "Failed",
        Cancelled => "Cancelled",
    }
}

/// One run of a stage: its jobs plus run numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInstance {
    pub id: i64,
    pub name: String,
    /// Run number of this stage within its pipeline run, starting at 1.
    pub counter: u32,
    /// Counter of the first run this one reruns, if it is a rerun.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerun_of_counter: Option<u32>,
    pub latest_run: bool,
    pub approval_type: ApprovalType,
    pub approved_by: String,
    pub fetch_materials: bool,
    /// Content hash of the configuration the stage was built from.
    pub config_version: String,
    pub created_at_ms: u64,
    pub jobs: Vec<JobInstance>,
}

crate::builder! {
    pub struct StageInstanceBuilder => StageInstance {
        into {
            name: String = "dev",
            approved_by: String = DEFAULT_APPROVER,
            config_version: String = "md5-test",
        }
        set {
            id: i64 = 1,
            counter: u32 = 1,
            rerun_of_counter: Option<u32> = None,
            latest_run: bool = true,
            approval_type: ApprovalType = ApprovalType::Success,
            fetch_materials: bool = true,
            created_at_ms: u64 = 1_000,
            jobs: Vec<JobInstance> = Vec::new(),
        }
    }
}

impl StageInstance {
    pub fn job(&self, name: &str) -> Option<&JobInstance> {
        self.jobs.iter().find(|j| j.name.eq_ignore_ascii_case(name))
    }

    pub fn job_mut(&mut self, name: &str) -> Option<&mut JobInstance> {
        self.jobs.iter_mut().find(|j| j.name.eq_ignore_ascii_case(name))
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    pub fn is_rerun(&self) -> bool {
        self.rerun_of_counter.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.jobs.iter().all(JobInstance::is_completed)
    }

    /// `Failed` beats `Cancelled` beats `Unknown`; `Passed` only when every job passed.
    pub fn result(&self) -> StageResult {
        let results = || self.jobs.iter().map(|j| j.result);
        if results().any(|r| r == JobResult::Failed) {
            StageResult::Failed
        } else if results().any(|r| r == JobResult::Cancelled) {
            StageResult::Cancelled
        } else if !self.jobs.is_empty() && results().all(|r| r == JobResult::Passed) {
            StageResult::Passed
        } else {
            StageResult::Unknown
        }
    }

    /// Drop persisted ids so the stage can be stored as a new run.
    pub fn clear_ids(&mut self) {
        self.id = UNPERSISTED_ID;
        for job in &mut self.jobs {
            job.set_id(UNPERSISTED_ID);
        }
    }
}

/// Why a pipeline run was triggered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCause {
    pub approver: String,
    #[serde(default)]
    pub message: String,
    /// Variables supplied at trigger time, overriding pipeline variables.
    #[serde(default)]
    pub variables: EnvironmentVariables,
}

impl BuildCause {
    pub fn manual(approver: impl Into<String>) -> Self {
        Self { approver: approver.into(), message: "Forced by user".to_string(), ..Self::default() }
    }

    pub fn with_variables(mut self, variables: EnvironmentVariables) -> Self {
        self.variables = variables;
        self
    }
}

/// One run of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineInstance {
    pub id: i64,
    pub name: String,
    pub counter: u32,
    pub label: String,
    pub label_template: String,
    /// Pipeline variables overridden by the build cause's variables.
    #[serde(default)]
    pub environment_variables: EnvironmentVariables,
    pub build_cause: BuildCause,
    pub stages: Vec<StageInstance>,
}

impl PipelineInstance {
    pub fn stage(&self, name: &str) -> Option<&StageInstance> {
        self.stages
            .iter()
            .filter(|s| s.name.eq_ignore_ascii_case(name))
            .max_by_key(|s| s.counter)
    }

    pub fn first_stage(&self) -> Option<&StageInstance> {
        self.stages.first()
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
