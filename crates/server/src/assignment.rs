// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Matching waiting jobs to idle agents and turning job plans into the
//! build command trees agents execute.

use crate::history::{JobHistory, JobLocator};
use dv_core::{AgentConfig, EnvironmentVariables, JobInstance, JobPlan, TaskConfig};
use dv_wire::{BuildCommand, BuildSettings};

/// Where agents send console output and artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildUrls {
    pub console_base: String,
    pub artifact_base: String,
}

/// First waiting job `agent` may run: pinned to it, or needing a subset of
/// its resources.
pub fn find_work<'a>(history: &'a JobHistory, agent: &AgentConfig) -> Option<&'a JobInstance> {
    history.scheduled_jobs().find(|job| job.plan.can_run_on(agent, job.agent_uuid.as_deref()))
}

/// Variables every build sees, describing where it sits.
pub fn build_variables(locator: &JobLocator) -> EnvironmentVariables {
    let mut vars = EnvironmentVariables::new();
    vars.add("GO_PIPELINE_NAME", &locator.pipeline);
    vars.add("GO_PIPELINE_COUNTER", locator.pipeline_counter.to_string());
    vars.add("GO_PIPELINE_LABEL", &locator.pipeline_label);
    vars.add("GO_STAGE_NAME", &locator.stage);
    vars.add("GO_STAGE_COUNTER", locator.stage_counter.to_string());
    vars.add("GO_JOB_NAME", &locator.job);
    vars
}

/// Steps for one job: announce the build, run each task, then upload each
/// artifact.
pub fn build_command(plan: &JobPlan, locator: &JobLocator) -> BuildCommand {
    let mut env = build_variables(locator);
    env.override_with(&plan.variables);

    let mut prepare = vec![BuildCommand::echo(format!("[drover] Start to build {}", locator.for_display()))];
    prepare.extend(
        env.iter().map(|var| BuildCommand::echo(format!("[drover] setting environment variable {}", var))),
    );

    let tasks = plan
        .tasks
        .iter()
        .map(|task| match task {
            TaskConfig::Exec { command, args, working_dir } => BuildCommand::Exec {
                command: command.clone(),
                args: args.clone(),
                working_dir: working_dir.clone(),
                env: env.clone(),
            },
            TaskConfig::Echo { text } => BuildCommand::echo(text),
        })
        .collect();

    let uploads = plan
        .artifact_plans
        .iter()
        .map(|artifact| BuildCommand::upload_artifact(&artifact.source, &artifact.destination))
        .collect();

    BuildCommand::compose(vec![
        BuildCommand::compose(prepare),
        BuildCommand::compose(tasks),
        BuildCommand::compose(uploads),
    ])
}

pub fn build_settings(job: &JobInstance, locator: &JobLocator, urls: &BuildUrls) -> BuildSettings {
    let build_id = job.id.to_string();
    BuildSettings {
        console_url: format!("{}/{}", urls.console_base.trim_end_matches('/'), locator.path()),
        artifact_upload_base_url: format!("{}/{}", urls.artifact_base.trim_end_matches('/'), build_id),
        build_locator: locator.path(),
        build_locator_for_display: locator.for_display(),
        build_command: build_command(&job.plan, locator),
        build_id,
    }
}

#[cfg(test)]
#[path = "assignment_tests.rs"]
mod tests;
