// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Partial reruns of a stage.
//!
//! Selected jobs are re-expanded from the current configuration as fresh
//! Scheduled instances. Everything else is copied forward from the run
//! being rerun, keeping its result and agent.

use crate::context::SchedulingContext;
use crate::error::{ScheduleError, CONFIG_MISSING, NO_JOB_FOUND};
use crate::factory::InstanceFactory;
use dv_core::{
    run_on_all_name, Clock, InstanceName, JobConfig, JobInstance, JobRunType, StageConfig,
    StageInstance, UNPERSISTED_ID,
};

impl<C: Clock> InstanceFactory<C> {
    /// Build the next run of `stage` rerunning the jobs named in `job_names`.
    ///
    /// Output jobs follow `stage_config` order. Within one configured job the
    /// previous run's order is kept, with rerun instances in place of the
    /// selected ones. Previous instances with no configuration left are
    /// copied and appended. `stage` itself is never modified.
    pub fn create_stage_for_rerun_of_jobs<S: AsRef<str>>(
        &self,
        stage: &StageInstance,
        job_names: &[S],
        context: &SchedulingContext,
        stage_config: &StageConfig,
        config_version: &str,
    ) -> Result<StageInstance, ScheduleError> {
        if job_names.is_empty() {
            return Err(ScheduleError::NothingSelected);
        }
        let context = context.override_environment_variables(&stage_config.environment_variables);
        let selected = select(stage, job_names, stage_config)?;

        let mut claimed = vec![false; stage.jobs.len()];
        let mut jobs = Vec::with_capacity(stage.jobs.len());
        for config in &stage_config.jobs {
            let group: Vec<usize> = (0..stage.jobs.len())
                .filter(|&i| !claimed[i] && InstanceName::parse(&stage.jobs[i].name).belongs_to(&config.name))
                .collect();
            for &i in &group {
                claimed[i] = true;
            }
            jobs.extend(self.rerun_group(stage, &group, &selected, config, &context)?);
        }
        jobs.extend(
            stage.jobs.iter().zip(&claimed).filter(|(_, c)| !**c).map(|(j, _)| j.copy_forward()),
        );

        tracing::info!(
            stage = %stage.name,
            counter = stage.counter,
            jobs = ?job_names.iter().map(AsRef::as_ref).collect::<Vec<_>>(),
            "rerunning jobs"
        );

        Ok(StageInstance {
            id: UNPERSISTED_ID,
            name: stage.name.clone(),
            counter: stage.counter + 1,
            rerun_of_counter: Some(stage.rerun_of_counter.unwrap_or(stage.counter)),
            latest_run: true,
            approval_type: stage.approval_type,
            approved_by: context.approved_by().to_string(),
            fetch_materials: stage.fetch_materials,
            config_version: config_version.to_string(),
            created_at_ms: self.clock.epoch_ms(),
            jobs,
        })
    }

    /// Rerun or copy every previous instance of one configured job.
    fn rerun_group(
        &self,
        stage: &StageInstance,
        group: &[usize],
        selected: &[usize],
        config: &JobConfig,
        context: &SchedulingContext,
    ) -> Result<Vec<JobInstance>, ScheduleError> {
        let chosen: Vec<usize> = group.iter().copied().filter(|i| selected.contains(i)).collect();
        if chosen.is_empty() {
            return Ok(group.iter().map(|&i| stage.jobs[i].copy_forward()).collect());
        }

        let current = config.run_type();
        for &i in &chosen {
            check_compatible(InstanceName::parse(&stage.jobs[i].name), current, &config.name)?;
        }
        if current == JobRunType::Simple && chosen.len() > 1 {
            return Err(ScheduleError::MultipleInstances(config.name.clone()));
        }

        let plan = self.create_job_plan(config, context);
        let mut out = Vec::new();
        for &i in group {
            let old = &stage.jobs[i];
            if !chosen.contains(&i) {
                out.push(old.copy_forward());
                continue;
            }
            match (InstanceName::parse(&old.name), current) {
                (InstanceName::Simple(_), JobRunType::Simple) => {
                    out.push(rerun(self.fresh(&config.name, plan.clone(), current)));
                }
                (InstanceName::RunOnAll { .. }, JobRunType::Simple) => {
                    let mut instance = self.fresh(&config.name, plan.clone(), current);
                    instance.agent_uuid = old.agent_uuid.clone();
                    out.push(rerun(instance));
                }
                (InstanceName::Simple(_), JobRunType::RunOnAllAgents) => {
                    let fanned = self.create_job_instances(&stage.name, config, context)?;
                    out.extend(fanned.into_iter().map(rerun));
                }
                (InstanceName::RunOnAll { index, .. }, JobRunType::RunOnAllAgents) => {
                    let matching = context.find_agents_matching(&config.resources);
                    let agent = matching
                        .get(index - 1)
                        .map(|a| a.uuid.clone())
                        .or_else(|| old.agent_uuid.clone())
                        .ok_or_else(|| ScheduleError::NoMatchingAgents {
                            job: config.name.clone(),
                            stage: stage.name.clone(),
                        })?;
                    let mut instance =
                        self.fresh(&run_on_all_name(&config.name, index), plan.clone(), current);
                    instance.agent_uuid = Some(agent);
                    out.push(rerun(instance));
                }
                (InstanceName::RunInstance { index, .. }, JobRunType::RunMultipleInstance(count)) => {
                    out.push(rerun(self.run_instance(&config.name, &plan, index, count)));
                }
                _ => return Err(ScheduleError::run_type_changed(&config.name, current)),
            }
        }
        Ok(out)
    }
}

/// Indexes of the previous instances named in `job_names`, validated
/// against the current configuration.
fn select<S: AsRef<str>>(
    stage: &StageInstance,
    job_names: &[S],
    stage_config: &StageConfig,
) -> Result<Vec<usize>, ScheduleError> {
    let mut selected = Vec::new();
    for name in job_names {
        let name = name.as_ref();
        let index = stage
            .jobs
            .iter()
            .position(|j| j.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| ScheduleError::cannot_rerun(name, NO_JOB_FOUND))?;
        let base = InstanceName::parse(&stage.jobs[index].name).base();
        if stage_config.job(base).is_none() {
            return Err(ScheduleError::cannot_rerun(base, CONFIG_MISSING));
        }
        if !selected.contains(&index) {
            selected.push(index);
        }
    }
    Ok(selected)
}

/// Run-multiple instances only rerun as run-multiple; nothing else becomes
/// run-multiple. Simple and run-on-all convert into each other.
fn check_compatible(
    previous: InstanceName<'_>,
    current: JobRunType,
    job_name: &str,
) -> Result<(), ScheduleError> {
    let was_multiple = matches!(previous, InstanceName::RunInstance { .. });
    let is_multiple = matches!(current, JobRunType::RunMultipleInstance(_));
    if was_multiple == is_multiple {
        Ok(())
    } else {
        Err(ScheduleError::run_type_changed(job_name, current))
    }
}

fn rerun(mut instance: JobInstance) -> JobInstance {
    instance.is_rerun = true;
    instance
}

#[cfg(test)]
#[path = "rerun_tests.rs"]
mod tests;
