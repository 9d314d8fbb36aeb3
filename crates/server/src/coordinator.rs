// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The coordinator: agent sessions, heartbeats, build assignment and the
//! operations that schedule, rerun and cancel work.
//!
//! All state sits behind one lock. Messages produced while it is held are
//! collected in an [`Outbox`] and delivered after it is released.

use crate::assignment::{self, BuildUrls};
use crate::config::LoadedConfig;
use crate::health::{HealthCategory, HealthState, HealthStateRegistry, HealthStateScope, HealthStateType};
use crate::history::{HistoryError, JobHistory};
use crate::registry::{AgentEntry, AgentRegistry, RegistryError};
use dv_core::{
    AgentBuildingInfo, AgentRuntimeRecord, ApprovalType, BuildCause, Clock, JobInstance,
    PipelineInstance, StageInstance, StageResult,
};
use dv_scheduler::{InstanceFactory, ScheduleError, SchedulingContext};
use dv_wire::{Action, ConsoleOut, Message, ProtocolError, Report, WorkAssignment};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// How long a duplicate-agent warning stays up.
const DUPLICATE_AGENT_WARNING: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("pipeline '{0}' is not configured")]
    PipelineNotConfigured(String),

    #[error("stage '{stage}' is not configured in pipeline '{pipeline}'")]
    StageNotConfigured { pipeline: String, stage: String },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Tunables for a coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub urls: BuildUrls,
    pub lost_contact_after: Duration,
    pub auto_register: bool,
}

/// Identifies one attached connection of an agent.
pub type SessionId = u64;

struct Session {
    id: SessionId,
    token: Option<String>,
    outbound: mpsc::UnboundedSender<Message>,
}

struct State {
    config: LoadedConfig,
    registry: AgentRegistry,
    history: JobHistory,
    health: HealthStateRegistry,
    consoles: HashMap<String, Vec<String>>,
}

/// Messages to deliver once the state lock is released.
#[derive(Default)]
struct Outbox(Vec<(String, Message)>);

impl Outbox {
    fn push(&mut self, uuid: &str, message: Result<Message, ProtocolError>) {
        match message {
            Ok(message) => self.0.push((uuid.to_string(), message)),
            Err(e) => tracing::error!(agent_uuid = %uuid, error = %e, "failed to encode message"),
        }
    }
}

pub struct Coordinator<C: Clock> {
    clock: C,
    factory: InstanceFactory<C>,
    urls: BuildUrls,
    state: Mutex<State>,
    sessions: Mutex<HashMap<String, Session>>,
    next_session: Mutex<SessionId>,
}

impl<C: Clock> Coordinator<C> {
    pub fn new(clock: C, config: LoadedConfig, settings: CoordinatorSettings) -> Self {
        let mut registry =
            AgentRegistry::new(settings.lost_contact_after).with_auto_register(settings.auto_register);
        registry.sync_config(&config.config.agents);
        Self {
            factory: InstanceFactory::new(clock.clone()),
            clock,
            urls: settings.urls,
            state: Mutex::new(State {
                config,
                registry,
                history: JobHistory::new(),
                health: HealthStateRegistry::new(),
                consoles: HashMap::new(),
            }),
            sessions: Mutex::new(HashMap::new()),
            next_session: Mutex::new(0),
        }
    }

    // ── Sessions ────────────────────────────────────────────────────────

    /// Check the credential presented when an agent connects.
    pub fn authenticate(&self, uuid: &str, token: Option<&str>) -> Result<(), RegistryError> {
        self.state.lock().registry.authenticate(uuid, token)
    }

    /// Route messages for `uuid` to `outbound`, replacing any earlier
    /// connection of the same agent.
    pub fn attach(
        &self,
        uuid: &str,
        token: Option<String>,
        outbound: mpsc::UnboundedSender<Message>,
    ) -> SessionId {
        let id = {
            let mut next = self.next_session.lock();
            *next += 1;
            *next
        };
        if self.sessions.lock().insert(uuid.to_string(), Session { id, token, outbound }).is_some() {
            tracing::info!(agent_uuid = %uuid, "replaced existing agent session");
        }
        tracing::info!(agent_uuid = %uuid, session = id, "agent session attached");
        id
    }

    /// Forget a session unless it has already been replaced.
    pub fn detach(&self, uuid: &str, session: SessionId) {
        let mut sessions = self.sessions.lock();
        if sessions.get(uuid).is_some_and(|s| s.id == session) {
            sessions.remove(uuid);
            tracing::info!(agent_uuid = %uuid, session, "agent session detached");
        }
    }

    pub fn is_connected(&self, uuid: &str) -> bool {
        self.sessions.lock().contains_key(uuid)
    }

    // ── Inbound messages ────────────────────────────────────────────────

    /// Process one message from `uuid`, then acknowledge it if it asked.
    pub fn handle(&self, uuid: &str, message: Message) {
        tracing::debug!(agent_uuid = %uuid, action = %message.action, "received");
        let mut outbox = Outbox::default();
        match message.action {
            Action::Ping => match message.data_as::<Report>() {
                Ok(report) => self.on_ping(uuid, report, &mut outbox),
                Err(e) => tracing::warn!(agent_uuid = %uuid, error = %e, "malformed ping"),
            },
            Action::ReportCurrentStatus | Action::ReportCompleted => match message.data_as::<Report>() {
                Ok(report) => self.on_report(uuid, report, &mut outbox),
                Err(e) => tracing::warn!(agent_uuid = %uuid, error = %e, "malformed report"),
            },
            Action::ConsoleOut => match message.data_as::<ConsoleOut>() {
                Ok(out) => self.on_console(uuid, out),
                Err(e) => tracing::warn!(agent_uuid = %uuid, error = %e, "malformed console output"),
            },
            Action::Acknowledge | Action::Ack => {}
            Action::SetCookie
            | Action::AssignWork
            | Action::Build
            | Action::CancelBuild
            | Action::Reregister => {
                tracing::warn!(agent_uuid = %uuid, action = %message.action, "unexpected action from agent")
            }
        }
        if let Some(ack_id) = &message.ack_id {
            outbox.push(uuid, Message::acknowledge(ack_id));
        }
        self.deliver(outbox);
    }

    fn on_ping(&self, uuid: &str, report: Report, outbox: &mut Outbox) {
        let mut record = report.agent_runtime_info;
        if record.uuid() != uuid {
            tracing::warn!(agent_uuid = %uuid, claimed = %record.uuid(), "heartbeat for another agent ignored");
            return;
        }
        let token = self.sessions.lock().get(uuid).and_then(|s| s.token.clone());
        let now = self.clock.epoch_ms();
        let mut state = self.state.lock();

        if !state.registry.register_if_allowed(&record.identifier, token.as_deref()) {
            tracing::info!(agent = %record.identifier, "unregistered agent refused");
            outbox.push(uuid, Message::assign_work(&WorkAssignment::UnregisteredAgent));
            return;
        }
        if record.cookie().is_none() {
            match state.registry.assign_cookie(uuid) {
                Ok(cookie) => {
                    outbox.push(uuid, Message::set_cookie(&cookie));
                    record.set_cookie(cookie);
                }
                Err(e) => {
                    tracing::warn!(agent_uuid = %uuid, error = %e, "cookie not assigned");
                    return;
                }
            }
        }
        record.ready();
        if !self.update_runtime_info(&mut state, &record, now, outbox) {
            return;
        }

        let Some(entry) = state.registry.get(uuid) else { return };
        if !entry.is_enabled() {
            outbox.push(uuid, Message::assign_work(&WorkAssignment::DeniedAgent));
            return;
        }
        if entry.is_available() && state.history.active_job_for(uuid).is_none() {
            self.assign_work(&mut state, uuid, outbox);
        }
    }

    /// Store `record`, telling a duplicate agent to re-register. Returns
    /// false when the record was refused.
    fn update_runtime_info(
        &self,
        state: &mut State,
        record: &AgentRuntimeRecord,
        now: u64,
        outbox: &mut Outbox,
    ) -> bool {
        match state.registry.update_runtime_info(record, now) {
            Ok(()) => true,
            Err(RegistryError::DuplicateAgent(uuid)) => {
                let cookie = record.cookie().unwrap_or_default();
                let existing = state.registry.get(&uuid).map(|e| e.record.identifier.to_string()).unwrap_or_default();
                let warning = HealthState::warning(
                    format!("[{}] has duplicate unique identifier which conflicts with [{}]", record.identifier, existing),
                    "Please check the agent installation.",
                    HealthStateType::duplicate_agent(cookie),
                )
                .expiring_at(now + DUPLICATE_AGENT_WARNING.as_millis() as u64);
                state.health.update(warning);
                outbox.push(&uuid, Ok(Message::reregister()));
                false
            }
            Err(e) => {
                tracing::warn!(agent = %record.identifier, error = %e, "heartbeat refused");
                false
            }
        }
    }

    fn assign_work(&self, state: &mut State, uuid: &str, outbox: &mut Outbox) {
        let Some(agent) = state.registry.get(uuid).map(|e| e.config.clone()) else { return };
        let Some(job_id) = assignment::find_work(&state.history, &agent).map(|j| j.id) else { return };
        let Some(locator) = state.history.locate(job_id) else { return };
        if let Err(e) = state.history.assign(job_id, uuid, self.clock.epoch_ms()) {
            tracing::error!(job_id, error = %e, "failed to assign job");
            return;
        }
        let Some(job) = state.history.job(job_id) else { return };
        let settings = assignment::build_settings(job, &locator, &self.urls);
        let info = AgentBuildingInfo::new(locator.for_display(), locator.path());
        if let Err(e) = state.registry.building(uuid, info) {
            tracing::warn!(agent_uuid = %uuid, error = %e, "agent not marked building");
        }
        tracing::info!(agent_uuid = %uuid, job = %locator.path(), job_id, "job assigned");
        outbox.push(uuid, Message::build(&settings));
    }

    fn on_report(&self, uuid: &str, report: Report, outbox: &mut Outbox) {
        let now = self.clock.epoch_ms();
        let mut state = self.state.lock();
        if !self.update_runtime_info(&mut state, &report.agent_runtime_info, now, outbox) {
            return;
        }
        let Some(job_id) = report.build_id.as_deref().and_then(|id| id.parse::<i64>().ok()) else {
            tracing::warn!(agent_uuid = %uuid, build_id = ?report.build_id, "report without a known build id");
            return;
        };
        if report.result.is_some() {
            if let Err(e) = state.registry.finished(uuid) {
                tracing::warn!(agent_uuid = %uuid, error = %e, "agent not freed");
            }
        }
        let outcome = match (report.result, report.job_state) {
            (Some(result), _) => state.history.complete(job_id, result, now).map(Some),
            (None, Some(job_state)) => state.history.update_state(job_id, job_state, now).map(|()| None),
            (None, None) => Ok(None),
        };
        match outcome {
            Ok(Some(completion)) if completion.stage_finished => {
                self.on_stage_finished(&mut state, completion.pipeline_id, &completion.stage);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(agent_uuid = %uuid, job_id, error = %e, "report not applied"),
        }
    }

    /// Schedule the next stage when this one passed and the next one is
    /// approved on success.
    fn on_stage_finished(&self, state: &mut State, pipeline_id: i64, stage: &str) {
        let Ok(finished) = state.history.latest_stage(pipeline_id, stage) else { return };
        let result = finished.result();
        let Some(pipeline) = state.history.pipeline(pipeline_id) else { return };
        tracing::info!(pipeline = %pipeline.name, counter = pipeline.counter, %stage, %result, "stage finished");
        if result != StageResult::Passed {
            return;
        }
        let pipeline_name = pipeline.name.clone();
        let Some(pipeline_config) = state.config.config.pipeline(&pipeline_name).cloned() else { return };
        let Some(next) = pipeline_config.next_stage(stage) else { return };
        if next.approval != ApprovalType::Success {
            return;
        }
        let next_name = next.name.clone();
        if let Err(e) = self.schedule_stage(state, pipeline_id, &next_name) {
            tracing::warn!(pipeline = %pipeline_name, stage = %next_name, error = %e, "next stage not scheduled");
        }
    }

    fn on_console(&self, uuid: &str, out: ConsoleOut) {
        tracing::debug!(agent_uuid = %uuid, build_id = %out.build_id, line = %out.line, "console");
        self.state.lock().consoles.entry(out.build_id).or_default().push(out.line);
    }

    fn deliver(&self, outbox: Outbox) {
        let sessions = self.sessions.lock();
        for (uuid, message) in outbox.0 {
            match sessions.get(&uuid) {
                Some(session) => {
                    tracing::debug!(agent_uuid = %uuid, action = %message.action, "sending");
                    if session.outbound.send(message).is_err() {
                        tracing::debug!(agent_uuid = %uuid, "agent session closed");
                    }
                }
                None => tracing::debug!(agent_uuid = %uuid, action = %message.action, "agent not connected"),
            }
        }
    }

    // ── Operations ──────────────────────────────────────────────────────

    /// Start a new run of `pipeline` with only its first stage scheduled.
    pub fn trigger(&self, pipeline: &str, cause: BuildCause) -> Result<PipelineInstance, CoordinatorError> {
        let mut state = self.state.lock();
        let config = state
            .config
            .config
            .pipeline(pipeline)
            .cloned()
            .ok_or_else(|| CoordinatorError::PipelineNotConfigured(pipeline.to_string()))?;
        let context = scheduling_context(&state, &cause.approver);
        let health_type = HealthStateType::new(HealthCategory::Scheduling, HealthStateScope::for_pipeline(&config.name));
        let instance = self
            .factory
            .create_pipeline_instance(&config, cause, &context, &state.config.version)
            .inspect_err(|e| {
                state.health.update(HealthState::error(
                    format!("Failed to trigger pipeline [{}]", config.name),
                    e.to_string(),
                    health_type.clone(),
                ));
            })?;
        state.health.update(HealthState::ok(health_type));
        Ok(state.history.save_pipeline(instance).clone())
    }

    /// Run a stage of an existing pipeline run from scratch: a manually
    /// approved stage, or a complete rerun.
    pub fn run_stage(&self, pipeline_id: i64, stage: &str) -> Result<StageInstance, CoordinatorError> {
        let mut state = self.state.lock();
        self.schedule_stage(&mut state, pipeline_id, stage)
    }

    fn schedule_stage(
        &self,
        state: &mut State,
        pipeline_id: i64,
        stage: &str,
    ) -> Result<StageInstance, CoordinatorError> {
        let run = state.history.pipeline(pipeline_id).ok_or(HistoryError::PipelineNotFound(pipeline_id))?;
        let config = state
            .config
            .config
            .pipeline(&run.name)
            .cloned()
            .ok_or_else(|| CoordinatorError::PipelineNotConfigured(run.name.clone()))?;
        let context = scheduling_context(state, &run.build_cause.approver)
            .override_environment_variables(&run.environment_variables);
        let instance =
            self.factory.create_stage_instance_for(&config, stage, &context, &state.config.version)?;
        Ok(state.history.save_stage(pipeline_id, instance)?.clone())
    }

    /// Rerun the named jobs of the latest run of `stage`.
    pub fn rerun_jobs<S: AsRef<str>>(
        &self,
        pipeline_id: i64,
        stage: &str,
        job_names: &[S],
        approved_by: &str,
    ) -> Result<StageInstance, CoordinatorError> {
        let mut state = self.state.lock();
        let previous = state.history.latest_stage(pipeline_id, stage)?.clone();
        let run = state.history.pipeline(pipeline_id).ok_or(HistoryError::PipelineNotFound(pipeline_id))?;
        let pipeline_name = run.name.clone();
        let variables = run.environment_variables.clone();
        let stage_config = state
            .config
            .config
            .pipeline(&pipeline_name)
            .and_then(|p| p.stage(stage))
            .cloned()
            .ok_or_else(|| CoordinatorError::StageNotConfigured {
                pipeline: pipeline_name.clone(),
                stage: stage.to_string(),
            })?;
        let context = scheduling_context(&state, approved_by).override_environment_variables(&variables);
        let rerun = self.factory.create_stage_for_rerun_of_jobs(
            &previous,
            job_names,
            &context,
            &stage_config,
            &state.config.version,
        )?;
        Ok(state.history.save_stage(pipeline_id, rerun)?.clone())
    }

    /// Cancel one job, telling its agent to stop if it has one.
    pub fn cancel_job(&self, job_id: i64) -> Result<(), CoordinatorError> {
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.lock();
            if let Some(agent) = state.history.cancel_job(job_id, self.clock.epoch_ms())? {
                outbox.push(&agent, Ok(Message::cancel_build()));
            }
        }
        self.deliver(outbox);
        Ok(())
    }

    /// Cancel every unfinished job of the latest run of `stage`.
    pub fn cancel_stage(&self, pipeline_id: i64, stage: &str) -> Result<(), CoordinatorError> {
        let jobs = self.state.lock().history.unfinished_jobs(pipeline_id, stage)?;
        for job_id in jobs {
            self.cancel_job(job_id)?;
        }
        Ok(())
    }

    pub fn enable_agent(&self, uuid: &str) -> Result<(), CoordinatorError> {
        Ok(self.state.lock().registry.enable(uuid)?)
    }

    pub fn disable_agent(&self, uuid: &str) -> Result<(), CoordinatorError> {
        Ok(self.state.lock().registry.disable(uuid)?)
    }

    /// Swap in a new configuration.
    pub fn reload_config(&self, config: LoadedConfig) {
        let mut state = self.state.lock();
        state.registry.sync_config(&config.config.agents);
        if state.config.version != config.version {
            tracing::info!(version = %config.version, "configuration reloaded");
        }
        state.config = config;
        state.health.update(HealthState::ok(HealthStateType::invalid_config()));
        let now = self.clock.epoch_ms();
        let State { config, health, .. } = &mut *state;
        health.purge_stale_entries(&config.config, now);
    }

    /// Record that a configuration reload failed; the previous one stays.
    pub fn config_invalid(&self, reason: impl std::fmt::Display) {
        self.state.lock().health.update(HealthState::error(
            "Invalid configuration",
            reason.to_string(),
            HealthStateType::invalid_config(),
        ));
    }

    /// Periodic housekeeping: age out quiet agents and stale health entries.
    pub fn refresh(&self) -> Vec<String> {
        let now = self.clock.epoch_ms();
        let mut state = self.state.lock();
        let State { config, registry, health, .. } = &mut *state;
        let lost = registry.refresh(now);
        health.purge_stale_entries(&config.config, now);
        lost
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn agent(&self, uuid: &str) -> Option<AgentEntry> {
        self.state.lock().registry.get(uuid).cloned()
    }

    pub fn agents(&self) -> Vec<AgentEntry> {
        self.state.lock().registry.agents().cloned().collect()
    }

    pub fn job(&self, job_id: i64) -> Option<JobInstance> {
        self.state.lock().history.job(job_id).cloned()
    }

    pub fn pipeline(&self, pipeline_id: i64) -> Option<PipelineInstance> {
        self.state.lock().history.pipeline(pipeline_id).cloned()
    }

    pub fn latest_pipeline(&self, name: &str) -> Option<PipelineInstance> {
        self.state.lock().history.latest_pipeline(name).cloned()
    }

    pub fn console(&self, build_id: &str) -> Vec<String> {
        self.state.lock().consoles.get(build_id).cloned().unwrap_or_default()
    }

    pub fn health(&self) -> Vec<HealthState> {
        self.state.lock().health.logs()
    }

    pub fn config_version(&self) -> String {
        self.state.lock().config.version.clone()
    }
}

fn scheduling_context(state: &State, approved_by: &str) -> SchedulingContext {
    let config = &state.config.config;
    let agents = state.registry.agents().filter(|e| e.is_enabled()).map(|e| e.config.clone()).collect();
    SchedulingContext::new(approved_by, agents)
        .with_profiles(config.elastic_profiles.clone(), config.cluster_profiles.clone())
        .override_environment_variables(&config.environment_variables)
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
