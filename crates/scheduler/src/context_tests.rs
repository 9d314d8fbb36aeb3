// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dv_core::test_support::agent_config;

#[test]
fn matching_agents_keep_context_order_and_skip_disabled() {
    let ctx = SchedulingContext::new(
        "loser",
        vec![
            agent_config("abcd1234", &["foobar"]),
            agent_config("disabled", &["foobar"]).disabled(true),
            agent_config("1234abcd", &["baz", "foobar"]),
            agent_config("7890abdc", &["crapyagent"]),
        ],
    );
    let uuids: Vec<&str> = ctx
        .find_agents_matching(&Resources::new(["foobar"]))
        .into_iter()
        .map(|a| a.uuid.as_str())
        .collect();
    assert_eq!(uuids, vec!["abcd1234", "1234abcd"]);
}

#[test]
fn override_returns_new_context() {
    let base = SchedulingContext::default()
        .override_environment_variables(&[("A", "pipeline"), ("B", "b")].into_iter().collect());
    let stage = base.override_environment_variables(&[("A", "stage")].into_iter().collect());
    assert_eq!(base.variables().get("A"), Some("pipeline"));
    assert_eq!(stage.variables().get("A"), Some("stage"));
    assert_eq!(stage.variables().get("B"), Some("b"));
}

#[test]
fn default_approver_is_changes() {
    assert_eq!(SchedulingContext::default().approved_by(), DEFAULT_APPROVER);
}
