// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job plans: the configuration-derived template behind each job instance.

use crate::config::{AgentConfig, ArtifactConfig, ArtifactKind, ClusterProfile, ElasticProfile, Resources, TaskConfig};
use crate::env_vars::EnvironmentVariables;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPlan {
    pub source: String,
    pub destination: String,
    pub kind: ArtifactKind,
}

impl From<&ArtifactConfig> for ArtifactPlan {
    fn from(config: &ArtifactConfig) -> Self {
        Self {
            source: config.source.clone(),
            destination: config.destination.clone(),
            kind: config.kind,
        }
    }
}

/// What a job needs in order to run: resources, artifacts, environment and
/// elastic agent bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPlan {
    /// Persisted job id, -1 until the history store assigns one.
    pub job_id: i64,
    pub job_name: String,
    pub resources: Resources,
    pub artifact_plans: Vec<ArtifactPlan>,
    pub variables: EnvironmentVariables,
    pub tasks: Vec<TaskConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elastic_profile: Option<ElasticProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_profile: Option<ClusterProfile>,
    #[serde(default = "default_fetch_materials")]
    pub fetch_materials: bool,
}

fn default_fetch_materials() -> bool {
    true
}

impl JobPlan {
    /// Whether `agent` may pick up an instance of this plan. `pinned` is the
    /// instance's agent assignment, which overrides resource matching.
    pub fn can_run_on(&self, agent: &AgentConfig, pinned: Option<&str>) -> bool {
        if agent.disabled {
            return false;
        }
        match pinned {
            Some(uuid) => agent.uuid == uuid,
            None => agent.resources.satisfies(&self.resources),
        }
    }

    /// Plan with extra variables layered on top, as for run-multiple instances.
    pub fn with_variables(&self, extra: &EnvironmentVariables) -> Self {
        let mut plan = self.clone();
        plan.variables.override_with(extra);
        plan
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
