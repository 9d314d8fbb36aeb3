// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::agent::{AgentIdentifier, AgentRuntimeRecord};
use crate::config::{AgentConfig, Resources};
use crate::env_vars::EnvironmentVariables;
use crate::job::{JobInstance, JobResult, JobState};
use crate::plan::JobPlan;
use crate::stage::StageInstance;

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::job::{JobResult, JobState};
    use proptest::prelude::*;

    pub fn arb_job_state() -> impl Strategy<Value = JobState> {
        prop_oneof![
            Just(JobState::Scheduled),
            Just(JobState::Assigned),
            Just(JobState::Preparing),
            Just(JobState::Building),
            Just(JobState::Completed),
        ]
    }

    pub fn arb_job_result() -> impl Strategy<Value = JobResult> {
        prop_oneof![
            Just(JobResult::Unknown),
            Just(JobResult::Passed),
            Just(JobResult::Failed),
            Just(JobResult::Cancelled),
        ]
    }
}

// ── Factories ───────────────────────────────────────────────────────────

/// A plan with no resources, artifacts or variables.
pub fn job_plan(name: &str) -> JobPlan {
    JobPlan {
        job_id: -1,
        job_name: name.to_string(),
        resources: Resources::default(),
        artifact_plans: Vec::new(),
        variables: EnvironmentVariables::new(),
        tasks: Vec::new(),
        elastic_profile: None,
        cluster_profile: None,
        fetch_materials: true,
    }
}

pub fn agent_config(uuid: &str, resources: &[&str]) -> AgentConfig {
    AgentConfig::new(uuid, format!("host-{}", uuid), "127.0.0.1")
        .resources(Resources::new(resources.iter().copied()))
}

pub fn runtime_record(uuid: &str) -> AgentRuntimeRecord {
    AgentRuntimeRecord::new(
        AgentIdentifier::new(format!("host-{}", uuid), "127.0.0.1", uuid),
        "/tmp/drover-agent",
    )
}

/// A completed job instance with a persisted id.
pub fn completed_job(name: &str, id: i64, result: JobResult) -> JobInstance {
    let mut job = JobInstance::scheduled(name, job_plan(name), 1_000);
    job.set_id(id);
    job.assign(format!("agent-{}", id), 2_000);
    job.change_state(JobState::Building, 3_000);
    job.complete(result, 4_000);
    job
}

/// Stage `dev` run 1 whose jobs `job-1..` carry `results`, ids from 1.
pub fn stage_with_results(results: &[JobResult]) -> StageInstance {
    let jobs = results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let name = format!("job-{}", i + 1);
            if *r == JobResult::Unknown {
                JobInstance::scheduled(name.clone(), job_plan(&name), 1_000)
            } else {
                completed_job(&name, i as i64 + 1, *r)
            }
        })
        .collect();
    StageInstance::builder().jobs(jobs).build()
}
