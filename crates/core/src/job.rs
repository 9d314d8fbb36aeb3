// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job instances and their state machine.

use crate::plan::JobPlan;
use serde::{Deserialize, Serialize};

/// Id carried by instances and transitions that have not been persisted.
pub const UNPERSISTED_ID: i64 = -1;

/// Lifecycle state of a job instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    #[default]
    Scheduled,
    Assigned,
    Preparing,
    Building,
    Completed,
}

crate::simple_display! {
    JobState {
        Scheduled => "Scheduled",
        Assigned => "Assigned",
        Preparing => "Preparing",
        Building => "Building",
        Completed => "Completed",
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobResult {
    #[default]
    Unknown,
    Passed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    JobResult {
        Unknown => "Unknown",
        Passed => "Passed",
        Failed => "Failed",
        Cancelled => "Cancelled",
    }
}

/// Record of entering a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStateTransition {
    pub id: i64,
    pub state: JobState,
    pub at_ms: u64,
}

impl JobStateTransition {
    pub fn new(state: JobState, at_ms: u64) -> Self {
        Self { id: UNPERSISTED_ID, state, at_ms }
    }
}

/// One concrete, schedulable execution of a job plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInstance {
    pub id: i64,
    pub name: String,
    pub state: JobState,
    pub result: JobResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_uuid: Option<String>,
    #[serde(default)]
    pub is_rerun: bool,
    #[serde(default)]
    pub is_copy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_job_id: Option<i64>,
    #[serde(default)]
    pub run_on_all_agents: bool,
    #[serde(default)]
    pub run_multiple_instance: bool,
    pub transitions: Vec<JobStateTransition>,
    pub plan: JobPlan,
}

impl JobInstance {
    /// A freshly scheduled instance with a single `Scheduled` transition.
    pub fn scheduled(name: impl Into<String>, plan: JobPlan, now_ms: u64) -> Self {
        Self {
            id: UNPERSISTED_ID,
            name: name.into(),
            state: JobState::Scheduled,
            result: JobResult::Unknown,
            agent_uuid: None,
            is_rerun: false,
            is_copy: false,
            original_job_id: None,
            run_on_all_agents: false,
            run_multiple_instance: false,
            transitions: vec![JobStateTransition::new(JobState::Scheduled, now_ms)],
            plan,
        }
    }

    /// Move to `state`, recording a transition. Repeating the current state
    /// records nothing.
    pub fn change_state(&mut self, state: JobState, now_ms: u64) {
        if self.state == state {
            return;
        }
        self.state = state;
        self.transitions.push(JobStateTransition::new(state, now_ms));
    }

    pub fn assign(&mut self, agent_uuid: impl Into<String>, now_ms: u64) {
        self.agent_uuid = Some(agent_uuid.into());
        self.change_state(JobState::Assigned, now_ms);
    }

    pub fn complete(&mut self, result: JobResult, now_ms: u64) {
        self.result = result;
        self.change_state(JobState::Completed, now_ms);
    }

    /// Cancel an unfinished instance. Returns false if it had already completed.
    pub fn cancel(&mut self, now_ms: u64) -> bool {
        if self.is_completed() {
            return false;
        }
        self.complete(JobResult::Cancelled, now_ms);
        true
    }

    pub fn is_completed(&self) -> bool {
        self.state == JobState::Completed
    }

    /// Scheduled but not yet handed to an agent.
    pub fn is_waiting_for_agent(&self) -> bool {
        self.state == JobState::Scheduled
    }

    /// When the instance entered `state`, if it ever did.
    pub fn transition_time(&self, state: JobState) -> Option<u64> {
        self.transitions.iter().find(|t| t.state == state).map(|t| t.at_ms)
    }

    /// Give this instance and its plan a persisted id.
    pub fn set_id(&mut self, id: i64) {
        self.id = id;
        self.plan.job_id = id;
    }

    /// A carried-forward copy for a rerun stage.
    ///
    /// The copy keeps result, state and agent, points back at the first
    /// persisted instance in the copy chain, and drops every persisted id.
    pub fn copy_forward(&self) -> Self {
        let mut copy = self.clone();
        copy.set_id(UNPERSISTED_ID);
        copy.is_copy = true;
        copy.is_rerun = false;
        copy.original_job_id = self.original_job_id.or(Some(self.id));
        for transition in &mut copy.transitions {
            transition.id = UNPERSISTED_ID;
        }
        copy
    }

    /// Name of the configured job this instance was expanded from.
    pub fn config_name(&self) -> &str {
        InstanceName::parse(&self.name).base()
    }
}

pub const RUN_ON_ALL_MARKER: &str = "-runOnAll-";
pub const RUN_INSTANCE_MARKER: &str = "-runInstance-";

/// Name of the `index`th (1-based) run-on-all-agents instance of `base`.
pub fn run_on_all_name(base: &str, index: usize) -> String {
    format!("{}{}{}", base, RUN_ON_ALL_MARKER, index)
}

/// Name of the `index`th (1-based) run-multiple instance of `base`.
pub fn run_instance_name(base: &str, index: usize) -> String {
    format!("{}{}{}", base, RUN_INSTANCE_MARKER, index)
}

/// An instance name split into configured job name and fan-out suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceName<'a> {
    Simple(&'a str),
    RunOnAll { base: &'a str, index: usize },
    RunInstance { base: &'a str, index: usize },
}

impl<'a> InstanceName<'a> {
    pub fn parse(name: &'a str) -> Self {
        if let Some((base, index)) = split_suffix(name, RUN_ON_ALL_MARKER) {
            return Self::RunOnAll { base, index };
        }
        if let Some((base, index)) = split_suffix(name, RUN_INSTANCE_MARKER) {
            return Self::RunInstance { base, index };
        }
        Self::Simple(name)
    }

    pub fn base(&self) -> &'a str {
        match *self {
            Self::Simple(base) => base,
            Self::RunOnAll { base, .. } | Self::RunInstance { base, .. } => base,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match *self {
            Self::Simple(_) => None,
            Self::RunOnAll { index, .. } | Self::RunInstance { index, .. } => Some(index),
        }
    }

    /// Whether this names an instance expanded from configured job `job_name`.
    pub fn belongs_to(&self, job_name: &str) -> bool {
        self.base().eq_ignore_ascii_case(job_name)
    }
}

fn split_suffix<'a>(name: &'a str, marker: &str) -> Option<(&'a str, usize)> {
    let at = name.rfind(marker)?;
    let digits = &name[at + marker.len()..];
    if at == 0 || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = digits.parse().ok().filter(|i| *i > 0)?;
    Some((&name[..at], index))
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
