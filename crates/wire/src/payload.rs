// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message payloads.

use dv_core::{AgentRuntimeRecord, EnvironmentVariables, JobResult, JobState};
use serde::{Deserialize, Serialize};

/// Agent status report: heartbeat, status change or completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub agent_runtime_info: AgentRuntimeRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_state: Option<JobState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

impl Report {
    pub fn heartbeat(record: AgentRuntimeRecord) -> Self {
        Self { agent_runtime_info: record, build_id: None, job_state: None, result: None }
    }

    pub fn status(record: AgentRuntimeRecord, build_id: impl Into<String>, state: JobState) -> Self {
        Self {
            agent_runtime_info: record,
            build_id: Some(build_id.into()),
            job_state: Some(state),
            result: None,
        }
    }

    pub fn completed(
        record: AgentRuntimeRecord,
        build_id: impl Into<String>,
        result: JobResult,
    ) -> Self {
        Self {
            agent_runtime_info: record,
            build_id: Some(build_id.into()),
            job_state: Some(JobState::Completed),
            result: Some(result),
        }
    }
}

/// Console output streamed from a running build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleOut {
    pub build_id: String,
    pub line: String,
}

/// Instruction derived from the coordinator's reply to a status report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInstruction {
    pub should_cancel_job: bool,
}

impl AgentInstruction {
    pub const NONE: Self = Self { should_cancel_job: false };
    pub const CANCEL: Self = Self { should_cancel_job: true };

    pub fn is_cancelled(&self) -> bool {
        self.should_cancel_job
    }
}

/// Named value recorded against a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// One step of a build, possibly composite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase")]
pub enum BuildCommand {
    Compose {
        commands: Vec<BuildCommand>,
    },
    Echo {
        line: String,
    },
    #[serde(rename_all = "camelCase")]
    Exec {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
        #[serde(default)]
        env: EnvironmentVariables,
    },
    ReportCurrentStatus {
        state: JobState,
    },
    UploadArtifact {
        src: String,
        dest: String,
    },
}

impl BuildCommand {
    pub fn compose(commands: Vec<BuildCommand>) -> Self {
        Self::Compose { commands }
    }

    pub fn echo(line: impl Into<String>) -> Self {
        Self::Echo { line: line.into() }
    }

    pub fn exec(command: impl Into<String>, args: Vec<String>) -> Self {
        Self::Exec {
            command: command.into(),
            args,
            working_dir: None,
            env: EnvironmentVariables::new(),
        }
    }

    pub fn report_current_status(state: JobState) -> Self {
        Self::ReportCurrentStatus { state }
    }

    pub fn upload_artifact(src: impl Into<String>, dest: impl Into<String>) -> Self {
        Self::UploadArtifact { src: src.into(), dest: dest.into() }
    }

    /// Number of leaf steps in this tree.
    pub fn step_count(&self) -> usize {
        match self {
            Self::Compose { commands } => commands.iter().map(Self::step_count).sum(),
            _ => 1,
        }
    }
}

/// Everything an agent needs to run and report one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSettings {
    pub build_id: String,
    pub build_locator: String,
    pub build_locator_for_display: String,
    #[serde(default)]
    pub console_url: String,
    #[serde(default)]
    pub artifact_upload_base_url: String,
    pub build_command: BuildCommand,
}

/// Work handed to an agent by `assignWork`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkAssignment {
    Build {
        settings: BuildSettings,
    },
    /// Diagnostic work that sleeps, recording its outcome as a property.
    #[serde(rename_all = "camelCase")]
    Sleep {
        name: String,
        millis: u64,
    },
    NoWork,
    /// The coordinator refused this agent work.
    DeniedAgent,
    /// The coordinator does not know this agent.
    UnregisteredAgent,
}

impl WorkAssignment {
    pub fn is_actual_work(&self) -> bool {
        matches!(self, Self::Build { .. } | Self::Sleep { .. })
    }
}
