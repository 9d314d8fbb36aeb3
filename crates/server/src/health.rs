// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server health states: warnings and errors surfaced to operators.
//!
//! Each entry is keyed by its [`HealthStateType`], a category plus the scope
//! it applies to. Reporting an OK state for a type clears the entry.

use dv_core::DroverConfig;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HealthStateLevel {
    Error,
    Warning,
    Ok,
}

dv_core::simple_display! {
    HealthStateLevel {
        Error => "ERROR",
        Warning => "WARNING",
        Ok => "OK",
    }
}

/// What a health state is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthStateScope {
    Global,
    Pipeline(String),
    Stage { pipeline: String, stage: String },
    Job { pipeline: String, stage: String, job: String },
    /// An agent, identified by cookie.
    Agent(String),
}

impl HealthStateScope {
    pub fn for_pipeline(pipeline: &str) -> Self {
        Self::Pipeline(pipeline.to_string())
    }

    pub fn for_stage(pipeline: &str, stage: &str) -> Self {
        Self::Stage { pipeline: pipeline.to_string(), stage: stage.to_string() }
    }

    pub fn for_job(pipeline: &str, stage: &str, job: &str) -> Self {
        Self::Job { pipeline: pipeline.to_string(), stage: stage.to_string(), job: job.to_string() }
    }

    pub fn for_agent(cookie: &str) -> Self {
        Self::Agent(cookie.to_string())
    }

    /// Whether the thing this scope names no longer exists in `config`.
    /// Agent and global scopes are never removed this way.
    pub fn is_removed_from(&self, config: &DroverConfig) -> bool {
        match self {
            Self::Global | Self::Agent(_) => false,
            Self::Pipeline(pipeline) => config.pipeline(pipeline).is_none(),
            Self::Stage { pipeline, stage } => {
                config.pipeline(pipeline).and_then(|p| p.stage(stage)).is_none()
            }
            Self::Job { pipeline, stage, job } => config
                .pipeline(pipeline)
                .and_then(|p| p.stage(stage))
                .and_then(|s| s.job(job))
                .is_none(),
        }
    }
}

impl fmt::Display for HealthStateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "GLOBAL"),
            Self::Pipeline(p) => write!(f, "{}", p),
            Self::Stage { pipeline, stage } => write!(f, "{}/{}", pipeline, stage),
            Self::Job { pipeline, stage, job } => write!(f, "{}/{}/{}", pipeline, stage, job),
            Self::Agent(cookie) => write!(f, "agent {}", cookie),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HealthCategory {
    General,
    InvalidConfig,
    DuplicateAgent,
    Scheduling,
}

dv_core::simple_display! {
    HealthCategory {
        General => "general",
        InvalidConfig => "invalid-config",
        DuplicateAgent => "duplicate-agent",
        Scheduling => "scheduling",
    }
}

/// Key of a health entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HealthStateType {
    pub category: HealthCategory,
    pub scope: HealthStateScope,
}

impl HealthStateType {
    pub fn new(category: HealthCategory, scope: HealthStateScope) -> Self {
        Self { category, scope }
    }

    pub fn general(scope: HealthStateScope) -> Self {
        Self::new(HealthCategory::General, scope)
    }

    pub fn duplicate_agent(cookie: &str) -> Self {
        Self::new(HealthCategory::DuplicateAgent, HealthStateScope::for_agent(cookie))
    }

    pub fn invalid_config() -> Self {
        Self::new(HealthCategory::InvalidConfig, HealthStateScope::Global)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthState {
    pub level: HealthStateLevel,
    pub message: String,
    pub description: String,
    pub state_type: HealthStateType,
    /// Epoch millis after which the entry no longer applies.
    pub expires_at_ms: Option<u64>,
}

impl HealthState {
    pub fn error(
        message: impl Into<String>,
        description: impl Into<String>,
        state_type: HealthStateType,
    ) -> Self {
        Self::with_level(HealthStateLevel::Error, message, description, state_type)
    }

    pub fn warning(
        message: impl Into<String>,
        description: impl Into<String>,
        state_type: HealthStateType,
    ) -> Self {
        Self::with_level(HealthStateLevel::Warning, message, description, state_type)
    }

    pub fn ok(state_type: HealthStateType) -> Self {
        Self::with_level(HealthStateLevel::Ok, "", "", state_type)
    }

    fn with_level(
        level: HealthStateLevel,
        message: impl Into<String>,
        description: impl Into<String>,
        state_type: HealthStateType,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            description: description.into(),
            state_type,
            expires_at_ms: None,
        }
    }

    pub fn expiring_at(mut self, at_ms: u64) -> Self {
        self.expires_at_ms = Some(at_ms);
        self
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.level, self.state_type.scope, self.message)?;
        if !self.description.is_empty() {
            write!(f, ": {}", self.description)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct HealthStateRegistry {
    entries: HashMap<HealthStateType, HealthState>,
}

impl HealthStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `state`. An OK state removes any entry of its type and yields
    /// `None`; anything else replaces the entry and yields its type.
    pub fn update(&mut self, state: HealthState) -> Option<HealthStateType> {
        let state_type = state.state_type.clone();
        if state.level == HealthStateLevel::Ok {
            if self.entries.remove(&state_type).is_some() {
                tracing::info!(scope = %state_type.scope, category = %state_type.category, "health state cleared");
            }
            return None;
        }
        match state.level {
            HealthStateLevel::Error => tracing::error!(%state, "health state"),
            _ => tracing::warn!(%state, "health state"),
        }
        self.entries.insert(state_type.clone(), state);
        Some(state_type)
    }

    pub fn get(&self, state_type: &HealthStateType) -> Option<&HealthState> {
        self.entries.get(state_type)
    }

    pub fn remove_by_scope(&mut self, scope: &HealthStateScope) {
        self.entries.retain(|t, _| &t.scope != scope);
    }

    pub fn filter_by_scope(&self, scope: &HealthStateScope) -> Vec<HealthState> {
        sorted(self.entries.values().filter(|s| &s.state_type.scope == scope))
    }

    /// All entries, errors first, then by message.
    pub fn logs(&self) -> Vec<HealthState> {
        sorted(self.entries.values())
    }

    pub fn is_healthy(&self) -> bool {
        self.entries.values().all(|s| s.level != HealthStateLevel::Error)
    }

    /// Drop entries that have expired or whose scope has left `config`.
    pub fn purge_stale_entries(&mut self, config: &DroverConfig, now_ms: u64) {
        self.entries.retain(|t, state| !state.is_expired(now_ms) && !t.scope.is_removed_from(config));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn sorted<'a>(states: impl Iterator<Item = &'a HealthState>) -> Vec<HealthState> {
    let mut states: Vec<HealthState> = states.cloned().collect();
    states.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.message.cmp(&b.message)));
    states
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
