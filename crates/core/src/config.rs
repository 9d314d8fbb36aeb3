// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline, stage, job and agent configuration.
//!
//! These are the inputs to the instance factory. They deserialize from the
//! coordinator's TOML configuration file and carry no run state.

use crate::env_vars::EnvironmentVariables;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Set of resource tags, compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(Vec<String>);

impl Resources {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut resources = Self::default();
        for tag in tags {
            resources.add(tag);
        }
        resources
    }

    pub fn add(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.contains(&tag) {
            self.0.push(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Whether every tag in `required` is present here.
    pub fn satisfies(&self, required: &Resources) -> bool {
        required.0.iter().all(|t| self.contains(t))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Kind of artifact a job publishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    #[default]
    Build,
    Test,
}

crate::simple_display! {
    ArtifactKind {
        Build => "build",
        Test => "test",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub source: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub kind: ArtifactKind,
}

/// One step of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskConfig {
    Exec {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
    },
    Echo {
        text: String,
    },
}

/// How one configured job expands into instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRunType {
    Simple,
    RunOnAllAgents,
    RunMultipleInstance(u32),
}

impl JobRunType {
    /// Phrase used when reporting a run-type change on rerun.
    pub fn description(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::RunOnAllAgents => "run on all agents",
            Self::RunMultipleInstance(_) => "run multiple instance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub artifacts: Vec<ArtifactConfig>,
    #[serde(default)]
    pub environment_variables: EnvironmentVariables,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
    #[serde(default)]
    pub run_on_all_agents: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_instance_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elastic_profile_id: Option<String>,
}

impl JobConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Resources::default(),
            artifacts: Vec::new(),
            environment_variables: EnvironmentVariables::new(),
            tasks: Vec::new(),
            run_on_all_agents: false,
            run_instance_count: None,
            elastic_profile_id: None,
        }
    }

    crate::setters! {
        set {
            resources: Resources,
            environment_variables: EnvironmentVariables,
            run_on_all_agents: bool,
        }
        option {
            run_instance_count: u32,
            elastic_profile_id: String,
        }
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_artifact(mut self, artifact: ArtifactConfig) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn run_type(&self) -> JobRunType {
        match self.run_instance_count {
            Some(n) if n > 0 => JobRunType::RunMultipleInstance(n),
            _ if self.run_on_all_agents => JobRunType::RunOnAllAgents,
            _ => JobRunType::Simple,
        }
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Whether a stage starts automatically after its predecessor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalType {
    #[default]
    Success,
    Manual,
}

crate::simple_display! {
    ApprovalType {
        Success => "success",
        Manual => "manual",
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    #[serde(default)]
    pub approval: ApprovalType,
    #[serde(default = "default_true")]
    pub fetch_materials: bool,
    #[serde(default)]
    pub environment_variables: EnvironmentVariables,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl StageConfig {
    pub fn new(name: impl Into<String>, jobs: Vec<JobConfig>) -> Self {
        Self {
            name: name.into(),
            approval: ApprovalType::Success,
            fetch_materials: true,
            environment_variables: EnvironmentVariables::new(),
            jobs,
        }
    }

    crate::setters! {
        set {
            approval: ApprovalType,
            fetch_materials: bool,
            environment_variables: EnvironmentVariables,
        }
    }

    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.has_name(name))
    }
}

pub const DEFAULT_LABEL_TEMPLATE: &str = "${COUNT}";

fn default_label_template() -> String {
    DEFAULT_LABEL_TEMPLATE.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default = "default_label_template")]
    pub label_template: String,
    #[serde(default)]
    pub environment_variables: EnvironmentVariables,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    pub fn new(name: impl Into<String>, stages: Vec<StageConfig>) -> Self {
        Self {
            name: name.into(),
            label_template: default_label_template(),
            environment_variables: EnvironmentVariables::new(),
            stages,
        }
    }

    crate::setters! {
        into { label_template: String }
        set { environment_variables: EnvironmentVariables }
    }

    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn first_stage(&self) -> Option<&StageConfig> {
        self.stages.first()
    }

    /// The stage configured after `name`, if any.
    pub fn next_stage(&self, name: &str) -> Option<&StageConfig> {
        let idx = self.stages.iter().position(|s| s.name.eq_ignore_ascii_case(name))?;
        self.stages.get(idx + 1)
    }
}

/// Agent entry in configuration, as approved by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub uuid: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub disabled: bool,
}

impl AgentConfig {
    pub fn new(uuid: impl Into<String>, hostname: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            hostname: hostname.into(),
            ip_address: ip.into(),
            resources: Resources::default(),
            disabled: false,
        }
    }

    crate::setters! {
        set { resources: Resources, disabled: bool }
    }

    /// Enabled and carrying every tag in `required`.
    pub fn can_run(&self, required: &Resources) -> bool {
        !self.disabled && self.resources.satisfies(required)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElasticProfile {
    pub id: String,
    pub plugin_id: String,
    pub cluster_profile_id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub id: String,
    pub plugin_id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Whole coordinator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroverConfig {
    #[serde(default)]
    pub environment_variables: EnvironmentVariables,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub elastic_profiles: Vec<ElasticProfile>,
    #[serde(default)]
    pub cluster_profiles: Vec<ClusterProfile>,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

impl DroverConfig {
    pub fn pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn agent(&self, uuid: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.uuid == uuid)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
