// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out of job configuration into job, stage and pipeline instances.

use crate::context::SchedulingContext;
use crate::error::ScheduleError;
use dv_core::{
    run_instance_name, run_on_all_name, ArtifactPlan, BuildCause, Clock, EnvironmentVariables,
    JobConfig, JobInstance, JobPlan, JobRunType, PipelineConfig, PipelineInstance, StageConfig,
    StageInstance, UNPERSISTED_ID,
};

/// 1-based index injected into each run-multiple instance.
pub const GO_JOB_RUN_INDEX: &str = "GO_JOB_RUN_INDEX";
/// Total instance count injected into each run-multiple instance.
pub const GO_JOB_RUN_COUNT: &str = "GO_JOB_RUN_COUNT";

/// Builds run records from configuration.
#[derive(Clone)]
pub struct InstanceFactory<C: Clock> {
    pub(crate) clock: C,
}

impl<C: Clock> InstanceFactory<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Derive a job plan: context variables overridden by the job's own,
    /// elastic profile by id and cluster profile via the elastic profile.
    pub fn create_job_plan(&self, job: &JobConfig, context: &SchedulingContext) -> JobPlan {
        let variables = context.variables().overridden_by(&job.environment_variables);
        let elastic_profile = job.elastic_profile_id.as_deref().and_then(|id| {
            let profile = context.elastic_profile(id);
            if profile.is_none() {
                tracing::warn!(job = %job.name, elastic_profile = %id, "elastic profile not found");
            }
            profile.cloned()
        });
        let cluster_profile = elastic_profile
            .as_ref()
            .and_then(|p| context.cluster_profile(&p.cluster_profile_id))
            .cloned();

        JobPlan {
            job_id: UNPERSISTED_ID,
            job_name: job.name.clone(),
            resources: job.resources.clone(),
            artifact_plans: job.artifacts.iter().map(ArtifactPlan::from).collect(),
            variables,
            tasks: job.tasks.clone(),
            elastic_profile,
            cluster_profile,
            fetch_materials: true,
        }
    }

    /// Expand one configured job according to its run type.
    pub fn create_job_instances(
        &self,
        stage_name: &str,
        job: &JobConfig,
        context: &SchedulingContext,
    ) -> Result<Vec<JobInstance>, ScheduleError> {
        let plan = self.create_job_plan(job, context);
        match job.run_type() {
            JobRunType::Simple => Ok(vec![self.fresh(&job.name, plan, JobRunType::Simple)]),
            JobRunType::RunOnAllAgents => {
                let agents = context.find_agents_matching(&job.resources);
                if agents.is_empty() {
                    return Err(ScheduleError::NoMatchingAgents {
                        job: job.name.clone(),
                        stage: stage_name.to_string(),
                    });
                }
                Ok(agents
                    .iter()
                    .enumerate()
                    .map(|(i, agent)| {
                        let name = run_on_all_name(&job.name, i + 1);
                        let mut instance =
                            self.fresh(&name, plan.clone(), JobRunType::RunOnAllAgents);
                        instance.agent_uuid = Some(agent.uuid.clone());
                        instance
                    })
                    .collect())
            }
            JobRunType::RunMultipleInstance(count) => Ok((1..=count as usize)
                .map(|index| self.run_instance(&job.name, &plan, index, count))
                .collect()),
        }
    }

    /// A stage run whose jobs are each configured job's fan-out, in config order.
    pub fn create_stage_instance(
        &self,
        stage: &StageConfig,
        context: &SchedulingContext,
        config_version: &str,
    ) -> Result<StageInstance, ScheduleError> {
        let context = context.override_environment_variables(&stage.environment_variables);
        let mut jobs = Vec::new();
        for job in &stage.jobs {
            jobs.extend(self.create_job_instances(&stage.name, job, &context)?);
        }
        for job in &mut jobs {
            job.plan.fetch_materials = stage.fetch_materials;
        }

        Ok(StageInstance {
            id: UNPERSISTED_ID,
            name: stage.name.clone(),
            counter: 1,
            rerun_of_counter: None,
            latest_run: true,
            approval_type: stage.approval,
            approved_by: context.approved_by().to_string(),
            fetch_materials: stage.fetch_materials,
            config_version: config_version.to_string(),
            created_at_ms: self.clock.epoch_ms(),
            jobs,
        })
    }

    /// Instantiate the stage named `stage_name` of `pipeline`.
    pub fn create_stage_instance_for(
        &self,
        pipeline: &PipelineConfig,
        stage_name: &str,
        context: &SchedulingContext,
        config_version: &str,
    ) -> Result<StageInstance, ScheduleError> {
        let stage = pipeline.stage(stage_name).ok_or_else(|| ScheduleError::StageNotFound {
            pipeline: pipeline.name.clone(),
            stage: stage_name.to_string(),
        })?;
        let context = context.override_environment_variables(&pipeline.environment_variables);
        self.create_stage_instance(stage, &context, config_version)
    }

    /// A new pipeline run containing only its first stage.
    ///
    /// Build-cause variables override pipeline variables both for job plans
    /// and for label rendering. The label stays unrendered until the history
    /// store assigns a counter with [`update_counter`](crate::update_counter).
    pub fn create_pipeline_instance(
        &self,
        pipeline: &PipelineConfig,
        cause: BuildCause,
        context: &SchedulingContext,
        config_version: &str,
    ) -> Result<PipelineInstance, ScheduleError> {
        let first =
            pipeline.first_stage().ok_or_else(|| ScheduleError::EmptyPipeline(pipeline.name.clone()))?;
        let variables = pipeline.environment_variables.overridden_by(&cause.variables);
        let context = context.override_environment_variables(&variables);
        let stage = self.create_stage_instance(first, &context, config_version)?;

        Ok(PipelineInstance {
            id: UNPERSISTED_ID,
            name: pipeline.name.clone(),
            counter: 0,
            label: pipeline.label_template.clone(),
            label_template: pipeline.label_template.clone(),
            environment_variables: variables,
            build_cause: cause,
            stages: vec![stage],
        })
    }

    /// A Scheduled instance with a single transition stamped now.
    pub(crate) fn fresh(&self, name: &str, plan: JobPlan, run_type: JobRunType) -> JobInstance {
        let mut instance = JobInstance::scheduled(name, plan, self.clock.epoch_ms());
        instance.run_on_all_agents = run_type == JobRunType::RunOnAllAgents;
        instance.run_multiple_instance = matches!(run_type, JobRunType::RunMultipleInstance(_));
        instance
    }

    /// The `index`th of `count` run-multiple instances of `base`.
    pub(crate) fn run_instance(
        &self,
        base: &str,
        plan: &JobPlan,
        index: usize,
        count: u32,
    ) -> JobInstance {
        let mut injected = EnvironmentVariables::new();
        injected.add(GO_JOB_RUN_INDEX, index.to_string());
        injected.add(GO_JOB_RUN_COUNT, count.to_string());
        self.fresh(
            &run_instance_name(base, index),
            plan.with_variables(&injected),
            JobRunType::RunMultipleInstance(count),
        )
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
