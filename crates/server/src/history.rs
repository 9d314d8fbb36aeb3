// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory execution history.
//!
//! Persisting an instance assigns ids to it, its jobs and their state
//! transitions. Runs of the same stage share a pipeline; only the newest
//! run of a stage is flagged `latest_run`.

use dv_core::{JobInstance, JobResult, JobState, PipelineInstance, StageInstance};
use dv_scheduler::update_counter;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("job {0} not found")]
    JobNotFound(i64),

    #[error("pipeline run {0} not found")]
    PipelineNotFound(i64),

    #[error("no run of pipeline '{0}' found")]
    NoRuns(String),

    #[error("stage '{stage}' has not run in pipeline '{pipeline}'")]
    StageNotRun { pipeline: String, stage: String },

    #[error("job {0} has already completed")]
    AlreadyCompleted(i64),
}

/// Position of a job inside the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct JobSlot {
    pipeline: usize,
    stage: usize,
    job: usize,
}

/// Where a job sits, by name and counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLocator {
    pub pipeline: String,
    pub pipeline_counter: u32,
    pub pipeline_label: String,
    pub stage: String,
    pub stage_counter: u32,
    pub job: String,
}

impl JobLocator {
    /// `pipeline/counter/stage/counter/job`
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.pipeline, self.pipeline_counter, self.stage, self.stage_counter, self.job
        )
    }

    /// Like [`path`](Self::path) but with the pipeline label.
    pub fn for_display(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.pipeline, self.pipeline_label, self.stage, self.stage_counter, self.job
        )
    }
}

/// What changed when a job completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub pipeline_id: i64,
    pub stage: String,
    /// Set when this completion finished the whole stage run.
    pub stage_finished: bool,
}

#[derive(Default)]
pub struct JobHistory {
    pipelines: Vec<PipelineInstance>,
    counters: HashMap<String, u32>,
    next_pipeline_id: i64,
    next_stage_id: i64,
    next_job_id: i64,
    next_transition_id: i64,
}

impl JobHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a new pipeline run, assigning its counter and ids.
    pub fn save_pipeline(&mut self, mut pipeline: PipelineInstance) -> &PipelineInstance {
        let counter = self.counters.entry(pipeline.name.to_ascii_lowercase()).or_default();
        *counter += 1;
        update_counter(&mut pipeline, *counter);
        self.next_pipeline_id += 1;
        pipeline.id = self.next_pipeline_id;
        for stage in &mut pipeline.stages {
            self.assign_stage_ids(stage);
        }
        tracing::info!(pipeline = %pipeline.name, counter = pipeline.counter, label = %pipeline.label, "pipeline scheduled");
        let index = self.pipelines.len();
        self.pipelines.push(pipeline);
        &self.pipelines[index]
    }

    /// Persist a stage run into an existing pipeline run. Earlier runs of
    /// the same stage stop being the latest, and the new run's counter
    /// follows the highest existing one.
    pub fn save_stage(
        &mut self,
        pipeline_id: i64,
        mut stage: StageInstance,
    ) -> Result<&StageInstance, HistoryError> {
        let index = self.pipeline_index(pipeline_id)?;
        self.assign_stage_ids(&mut stage);
        let pipeline = &mut self.pipelines[index];
        let mut highest = 0;
        for previous in pipeline.stages.iter_mut().filter(|s| s.name.eq_ignore_ascii_case(&stage.name)) {
            previous.latest_run = false;
            highest = highest.max(previous.counter);
        }
        if highest > 0 {
            stage.counter = highest + 1;
        }
        stage.latest_run = true;
        tracing::info!(
            pipeline = %pipeline.name,
            stage = %stage.name,
            counter = stage.counter,
            rerun_of = ?stage.rerun_of_counter,
            "stage scheduled"
        );
        pipeline.stages.push(stage);
        let last = pipeline.stages.len() - 1;
        Ok(&pipeline.stages[last])
    }

    pub fn pipeline(&self, pipeline_id: i64) -> Option<&PipelineInstance> {
        self.pipelines.iter().find(|p| p.id == pipeline_id)
    }

    /// Most recent run of the named pipeline.
    pub fn latest_pipeline(&self, name: &str) -> Option<&PipelineInstance> {
        self.pipelines.iter().rev().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn pipeline_by_counter(&self, name: &str, counter: u32) -> Option<&PipelineInstance> {
        self.pipelines.iter().find(|p| p.name.eq_ignore_ascii_case(name) && p.counter == counter)
    }

    /// Latest run of `stage` in the pipeline run `pipeline_id`.
    pub fn latest_stage(&self, pipeline_id: i64, stage: &str) -> Result<&StageInstance, HistoryError> {
        let pipeline = self.pipeline(pipeline_id).ok_or(HistoryError::PipelineNotFound(pipeline_id))?;
        pipeline.stage(stage).ok_or_else(|| HistoryError::StageNotRun {
            pipeline: pipeline.name.clone(),
            stage: stage.to_string(),
        })
    }

    pub fn job(&self, job_id: i64) -> Option<&JobInstance> {
        let slot = self.slot(job_id)?;
        Some(&self.pipelines[slot.pipeline].stages[slot.stage].jobs[slot.job])
    }

    pub fn locate(&self, job_id: i64) -> Option<JobLocator> {
        let slot = self.slot(job_id)?;
        let pipeline = &self.pipelines[slot.pipeline];
        let stage = &pipeline.stages[slot.stage];
        Some(JobLocator {
            pipeline: pipeline.name.clone(),
            pipeline_counter: pipeline.counter,
            pipeline_label: pipeline.label.clone(),
            stage: stage.name.clone(),
            stage_counter: stage.counter,
            job: stage.jobs[slot.job].name.clone(),
        })
    }

    /// Jobs still waiting for an agent, oldest first.
    pub fn scheduled_jobs(&self) -> impl Iterator<Item = &JobInstance> {
        let mut waiting: Vec<&JobInstance> = self
            .pipelines
            .iter()
            .flat_map(|p| p.stages.iter())
            .filter(|s| s.latest_run)
            .flat_map(|s| s.jobs.iter())
            .filter(|j| j.is_waiting_for_agent())
            .collect();
        waiting.sort_by_key(|j| j.id);
        waiting.into_iter()
    }

    /// The unfinished job handed to `agent_uuid`, if any.
    pub fn active_job_for(&self, agent_uuid: &str) -> Option<&JobInstance> {
        self.pipelines
            .iter()
            .flat_map(|p| p.stages.iter())
            .flat_map(|s| s.jobs.iter())
            .find(|j| {
                !j.is_completed()
                    && !j.is_waiting_for_agent()
                    && !j.is_copy
                    && j.agent_uuid.as_deref() == Some(agent_uuid)
            })
    }

    pub fn assign(&mut self, job_id: i64, agent_uuid: &str, now_ms: u64) -> Result<(), HistoryError> {
        let transition_id = self.take_transition_id();
        let job = self.job_mut(job_id)?;
        job.assign(agent_uuid, now_ms);
        stamp_last_transition(job, transition_id);
        Ok(())
    }

    /// Apply a status report. Reports for completed jobs are refused.
    pub fn update_state(&mut self, job_id: i64, state: JobState, now_ms: u64) -> Result<(), HistoryError> {
        let transition_id = self.take_transition_id();
        let job = self.job_mut(job_id)?;
        if job.is_completed() {
            return Err(HistoryError::AlreadyCompleted(job_id));
        }
        if state == JobState::Completed {
            return Ok(());
        }
        job.change_state(state, now_ms);
        stamp_last_transition(job, transition_id);
        Ok(())
    }

    /// Record a job's result.
    pub fn complete(&mut self, job_id: i64, result: JobResult, now_ms: u64) -> Result<Completion, HistoryError> {
        let transition_id = self.take_transition_id();
        let slot = self.slot(job_id).ok_or(HistoryError::JobNotFound(job_id))?;
        let pipeline = &mut self.pipelines[slot.pipeline];
        let stage = &mut pipeline.stages[slot.stage];
        let job = &mut stage.jobs[slot.job];
        if job.is_completed() {
            return Err(HistoryError::AlreadyCompleted(job_id));
        }
        job.complete(result, now_ms);
        stamp_last_transition(job, transition_id);
        tracing::info!(job = %job.name, job_id, %result, "job completed");
        Ok(Completion {
            pipeline_id: pipeline.id,
            stage: stage.name.clone(),
            stage_finished: stage.is_completed(),
        })
    }

    /// Cancel an unfinished job. Returns the agent it was handed to, which
    /// must be told to stop.
    pub fn cancel_job(&mut self, job_id: i64, now_ms: u64) -> Result<Option<String>, HistoryError> {
        let transition_id = self.take_transition_id();
        let job = self.job_mut(job_id)?;
        let was_waiting = job.is_waiting_for_agent();
        if !job.cancel(now_ms) {
            return Err(HistoryError::AlreadyCompleted(job_id));
        }
        stamp_last_transition(job, transition_id);
        tracing::info!(job = %job.name, job_id, "job cancelled");
        Ok(if was_waiting { None } else { job.agent_uuid.clone() })
    }

    /// Ids of unfinished jobs in the latest run of a stage.
    pub fn unfinished_jobs(&self, pipeline_id: i64, stage: &str) -> Result<Vec<i64>, HistoryError> {
        Ok(self
            .latest_stage(pipeline_id, stage)?
            .jobs
            .iter()
            .filter(|j| !j.is_completed() && !j.is_copy)
            .map(|j| j.id)
            .collect())
    }

    fn assign_stage_ids(&mut self, stage: &mut StageInstance) {
        self.next_stage_id += 1;
        stage.id = self.next_stage_id;
        for job in &mut stage.jobs {
            self.next_job_id += 1;
            job.set_id(self.next_job_id);
            for transition in &mut job.transitions {
                self.next_transition_id += 1;
                transition.id = self.next_transition_id;
            }
        }
    }

    fn take_transition_id(&mut self) -> i64 {
        self.next_transition_id += 1;
        self.next_transition_id
    }

    fn pipeline_index(&self, pipeline_id: i64) -> Result<usize, HistoryError> {
        self.pipelines
            .iter()
            .position(|p| p.id == pipeline_id)
            .ok_or(HistoryError::PipelineNotFound(pipeline_id))
    }

    fn slot(&self, job_id: i64) -> Option<JobSlot> {
        for (p, pipeline) in self.pipelines.iter().enumerate() {
            for (s, stage) in pipeline.stages.iter().enumerate() {
                if let Some(j) = stage.jobs.iter().position(|j| j.id == job_id) {
                    return Some(JobSlot { pipeline: p, stage: s, job: j });
                }
            }
        }
        None
    }

    fn job_mut(&mut self, job_id: i64) -> Result<&mut JobInstance, HistoryError> {
        let slot = self.slot(job_id).ok_or(HistoryError::JobNotFound(job_id))?;
        Ok(&mut self.pipelines[slot.pipeline].stages[slot.stage].jobs[slot.job])
    }
}

/// Give a freshly recorded transition its persisted id.
fn stamp_last_transition(job: &mut JobInstance, id: i64) {
    if let Some(last) = job.transitions.last_mut() {
        if last.id == dv_core::UNPERSISTED_ID {
            last.id = id;
        }
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
