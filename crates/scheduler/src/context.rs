// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use dv_core::{
    AgentConfig, ClusterProfile, ElasticProfile, EnvironmentVariables, Resources, DEFAULT_APPROVER,
};

/// Snapshot of everything scheduling depends on besides the job
/// configuration itself.
#[derive(Debug, Clone)]
pub struct SchedulingContext {
    approved_by: String,
    agents: Vec<AgentConfig>,
    variables: EnvironmentVariables,
    elastic_profiles: Vec<ElasticProfile>,
    cluster_profiles: Vec<ClusterProfile>,
}

impl Default for SchedulingContext {
    fn default() -> Self {
        Self::new(DEFAULT_APPROVER, Vec::new())
    }
}

impl SchedulingContext {
    pub fn new(approved_by: impl Into<String>, agents: Vec<AgentConfig>) -> Self {
        Self {
            approved_by: approved_by.into(),
            agents,
            variables: EnvironmentVariables::new(),
            elastic_profiles: Vec::new(),
            cluster_profiles: Vec::new(),
        }
    }

    pub fn with_profiles(
        mut self,
        elastic_profiles: Vec<ElasticProfile>,
        cluster_profiles: Vec<ClusterProfile>,
    ) -> Self {
        self.elastic_profiles = elastic_profiles;
        self.cluster_profiles = cluster_profiles;
        self
    }

    /// A copy of this context whose variables are overridden by `vars`.
    pub fn override_environment_variables(&self, vars: &EnvironmentVariables) -> Self {
        let mut context = self.clone();
        context.variables.override_with(vars);
        context
    }

    pub fn approved_by(&self) -> &str {
        &self.approved_by
    }

    pub fn variables(&self) -> &EnvironmentVariables {
        &self.variables
    }

    pub fn agents(&self) -> &[AgentConfig] {
        &self.agents
    }

    /// Enabled agents carrying every resource in `required`, in context order.
    pub fn find_agents_matching(&self, required: &Resources) -> Vec<&AgentConfig> {
        self.agents.iter().filter(|a| a.can_run(required)).collect()
    }

    pub fn elastic_profile(&self, id: &str) -> Option<&ElasticProfile> {
        self.elastic_profiles.iter().find(|p| p.id == id)
    }

    pub fn cluster_profile(&self, id: &str) -> Option<&ClusterProfile> {
        self.cluster_profiles.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
