// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dv_core::{JobConfig, PipelineConfig, StageConfig};
use yare::parameterized;

fn config() -> DroverConfig {
    DroverConfig {
        pipelines: vec![PipelineConfig::new(
            "up42",
            vec![StageConfig::new("dev", vec![JobConfig::new("unit")])],
        )],
        ..DroverConfig::default()
    }
}

fn scheduling_error(scope: HealthStateScope) -> HealthState {
    HealthState::error("cannot schedule", "no agents", HealthStateType::new(HealthCategory::Scheduling, scope))
}

#[test]
fn error_state_is_recorded_under_its_type() {
    let mut registry = HealthStateRegistry::new();
    let state = scheduling_error(HealthStateScope::for_pipeline("up42"));

    let recorded = registry.update(state.clone());

    assert_eq!(recorded, Some(state.state_type.clone()));
    assert_eq!(registry.get(&state.state_type), Some(&state));
    assert!(!registry.is_healthy());
}

#[test]
fn ok_state_clears_the_entry_and_returns_none() {
    let mut registry = HealthStateRegistry::new();
    let state = scheduling_error(HealthStateScope::for_pipeline("up42"));
    registry.update(state.clone());

    assert_eq!(registry.update(HealthState::ok(state.state_type.clone())), None);
    assert!(registry.is_empty());
    assert!(registry.is_healthy());
}

#[test]
fn ok_state_for_unknown_type_is_a_no_op() {
    let mut registry = HealthStateRegistry::new();
    assert_eq!(registry.update(HealthState::ok(HealthStateType::invalid_config())), None);
    assert!(registry.is_empty());
}

#[test]
fn same_type_replaces_previous_entry() {
    let mut registry = HealthStateRegistry::new();
    let scope = HealthStateScope::for_stage("up42", "dev");
    registry.update(scheduling_error(scope.clone()));
    registry.update(HealthState::warning(
        "slow",
        "",
        HealthStateType::new(HealthCategory::Scheduling, scope.clone()),
    ));

    let states = registry.filter_by_scope(&scope);
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].level, HealthStateLevel::Warning);
}

#[test]
fn logs_list_errors_before_warnings() {
    let mut registry = HealthStateRegistry::new();
    registry.update(HealthState::warning("b", "", HealthStateType::duplicate_agent("cookie-1")));
    registry.update(scheduling_error(HealthStateScope::Global));
    registry.update(HealthState::warning("a", "", HealthStateType::duplicate_agent("cookie-2")));

    let messages: Vec<_> = registry.logs().into_iter().map(|s| s.message).collect();
    assert_eq!(messages, vec!["cannot schedule", "a", "b"]);
}

#[test]
fn remove_by_scope_keeps_other_scopes() {
    let mut registry = HealthStateRegistry::new();
    registry.update(scheduling_error(HealthStateScope::for_pipeline("up42")));
    registry.update(scheduling_error(HealthStateScope::Global));

    registry.remove_by_scope(&HealthStateScope::for_pipeline("up42"));

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.filter_by_scope(&HealthStateScope::Global).len(), 1);
}

#[test]
fn expired_entries_are_purged() {
    let mut registry = HealthStateRegistry::new();
    registry.update(HealthState::warning("dup", "", HealthStateType::duplicate_agent("c")).expiring_at(5_000));
    registry.update(scheduling_error(HealthStateScope::Global));

    registry.purge_stale_entries(&config(), 4_999);
    assert_eq!(registry.len(), 2);

    registry.purge_stale_entries(&config(), 5_000);
    assert_eq!(registry.len(), 1);
    assert!(registry.get(&HealthStateType::duplicate_agent("c")).is_none());
}

#[parameterized(
    global = { HealthStateScope::Global, false },
    agent = { HealthStateScope::for_agent("cookie"), false },
    pipeline_present = { HealthStateScope::for_pipeline("UP42"), false },
    pipeline_gone = { HealthStateScope::for_pipeline("other"), true },
    stage_present = { HealthStateScope::for_stage("up42", "dev"), false },
    stage_gone = { HealthStateScope::for_stage("up42", "prod"), true },
    job_present = { HealthStateScope::for_job("up42", "dev", "unit"), false },
    job_gone = { HealthStateScope::for_job("up42", "dev", "lint"), true },
)]
fn scope_removal_follows_config(scope: HealthStateScope, removed: bool) {
    assert_eq!(scope.is_removed_from(&config()), removed);
}

#[test]
fn entries_for_removed_scopes_are_purged() {
    let mut registry = HealthStateRegistry::new();
    registry.update(scheduling_error(HealthStateScope::for_job("up42", "dev", "lint")));
    registry.update(scheduling_error(HealthStateScope::for_job("up42", "dev", "unit")));

    registry.purge_stale_entries(&config(), 0);

    let remaining: Vec<_> = registry.logs().into_iter().map(|s| s.state_type.scope).collect();
    assert_eq!(remaining, vec![HealthStateScope::for_job("up42", "dev", "unit")]);
}

#[test]
fn display_includes_scope_and_description() {
    let state = scheduling_error(HealthStateScope::for_stage("up42", "dev"));
    assert_eq!(state.to_string(), "ERROR [up42/dev] cannot schedule: no agents");
}
