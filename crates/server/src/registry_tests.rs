// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dv_core::test_support::{agent_config, runtime_record};

const LOST_AFTER: Duration = Duration::from_secs(30);

fn registry() -> AgentRegistry {
    AgentRegistry::new(LOST_AFTER)
}

/// Register `uuid` and return a heartbeat record carrying its cookie.
fn cookied(registry: &mut AgentRegistry, uuid: &str) -> AgentRuntimeRecord {
    let mut record = runtime_record(uuid);
    assert!(registry.register_if_allowed(&record.identifier, Some("token")));
    let cookie = registry.assign_cookie(uuid).unwrap();
    record.set_cookie(cookie);
    record.idle();
    record
}

#[test]
fn configured_agents_start_missing() {
    let mut registry = registry();
    registry.sync_config(&[agent_config("a1", &["linux"])]);

    let entry = registry.get("a1").unwrap();
    assert_eq!(entry.status(), AgentRuntimeStatus::Missing);
    assert!(entry.config.resources.contains("linux"));
}

#[test]
fn authenticate_requires_a_token() {
    let mut registry = registry();
    assert_eq!(
        registry.authenticate("a1", None),
        Err(RegistryError::MissingCredential("a1".to_string()))
    );
    assert_eq!(
        registry.authenticate("a1", Some("")),
        Err(RegistryError::MissingCredential("a1".to_string()))
    );
}

#[test]
fn first_token_is_bound_to_a_configured_agent() {
    let mut registry = registry();
    registry.sync_config(&[agent_config("a1", &[])]);

    registry.authenticate("a1", Some("t1")).unwrap();
    registry.authenticate("a1", Some("t1")).unwrap();
    assert_eq!(
        registry.authenticate("a1", Some("t2")),
        Err(RegistryError::CredentialMismatch("a1".to_string()))
    );
}

#[test]
fn unknown_agent_is_admitted_until_first_heartbeat() {
    let mut registry = registry();
    registry.authenticate("stranger", Some("t")).unwrap();
    assert!(!registry.is_registered("stranger"));
}

#[test]
fn auto_registration_can_be_turned_off() {
    let mut registry = registry().with_auto_register(false);
    let record = runtime_record("stranger");
    assert!(!registry.register_if_allowed(&record.identifier, Some("t")));
    assert!(!registry.is_registered("stranger"));
}

#[test]
fn auto_registered_agent_keeps_its_token() {
    let mut registry = registry();
    let record = runtime_record("a1");
    assert!(registry.register_if_allowed(&record.identifier, Some("t1")));
    assert!(registry.authenticate("a1", Some("other")).is_err());
}

#[test]
fn heartbeat_without_cookie_is_rejected() {
    let mut registry = registry();
    let record = runtime_record("a1");
    registry.register_if_allowed(&record.identifier, Some("t"));

    assert_eq!(registry.update_runtime_info(&record, 10), Err(RegistryError::NoCookie("a1".into())));
}

#[test]
fn heartbeat_with_issued_cookie_is_stored() {
    let mut registry = registry();
    let record = cookied(&mut registry, "a1");

    registry.update_runtime_info(&record, 10).unwrap();

    let entry = registry.get("a1").unwrap();
    assert_eq!(entry.last_heard_ms, Some(10));
    assert!(entry.is_available());
}

#[test]
fn different_cookie_for_same_uuid_is_a_duplicate() {
    let mut registry = registry();
    let mut record = cookied(&mut registry, "a1");
    registry.update_runtime_info(&record, 10).unwrap();

    record.set_cookie("someone-else");
    assert_eq!(
        registry.update_runtime_info(&record, 20),
        Err(RegistryError::DuplicateAgent("a1".into()))
    );
    assert_eq!(registry.get("a1").unwrap().last_heard_ms, Some(10));
}

#[test]
fn reassigning_a_cookie_orphans_the_old_one() {
    let mut registry = registry();
    let old = cookied(&mut registry, "a1");
    registry.assign_cookie("a1").unwrap();

    assert!(registry.update_runtime_info(&old, 10).is_err());
}

#[test]
fn cookie_for_unknown_agent_is_an_error() {
    let mut registry = registry();
    assert_eq!(registry.assign_cookie("ghost"), Err(RegistryError::Unregistered("ghost".into())));
}

#[test]
fn quiet_agent_loses_contact_once() {
    let mut registry = registry();
    let record = cookied(&mut registry, "a1");
    registry.update_runtime_info(&record, 1_000).unwrap();

    assert!(registry.refresh(1_000 + 30_000).is_empty());
    assert_eq!(registry.refresh(1_000 + 30_001), vec!["a1".to_string()]);
    assert!(registry.refresh(1_000 + 60_000).is_empty());
    assert_eq!(registry.get("a1").unwrap().status(), AgentRuntimeStatus::LostContact);
}

#[test]
fn heartbeat_after_lost_contact_restores_the_agent() {
    let mut registry = registry();
    let record = cookied(&mut registry, "a1");
    registry.update_runtime_info(&record, 1_000).unwrap();
    registry.refresh(100_000);

    registry.update_runtime_info(&record, 100_001).unwrap();

    assert_eq!(registry.get("a1").unwrap().status(), AgentRuntimeStatus::Idle);
}

#[test]
fn disabled_agent_is_not_available() {
    let mut registry = registry();
    let record = cookied(&mut registry, "a1");
    registry.update_runtime_info(&record, 10).unwrap();

    registry.disable("a1").unwrap();
    let entry = registry.get("a1").unwrap();
    assert_eq!(entry.status(), AgentRuntimeStatus::Disabled);
    assert!(!entry.is_available());

    registry.enable("a1").unwrap();
    assert!(registry.get("a1").unwrap().is_available());
}

#[test]
fn building_marks_the_record_busy() {
    let mut registry = registry();
    let record = cookied(&mut registry, "a1");
    registry.update_runtime_info(&record, 10).unwrap();

    registry.building("a1", AgentBuildingInfo::new("up42/1/dev/1/unit", "up42/1/dev/1/unit")).unwrap();

    let entry = registry.get("a1").unwrap();
    assert_eq!(entry.status(), AgentRuntimeStatus::Building);
    assert!(!entry.is_available());
}

#[test]
fn finished_agent_is_available_again() {
    let mut registry = registry();
    let record = cookied(&mut registry, "a1");
    registry.update_runtime_info(&record, 10).unwrap();
    registry.building("a1", AgentBuildingInfo::new("up42/1/dev/1/unit", "up42/1/dev/1/unit")).unwrap();

    registry.finished("a1").unwrap();

    let entry = registry.get("a1").unwrap();
    assert_eq!(entry.status(), AgentRuntimeStatus::Idle);
    assert!(entry.record.building_info().is_none());
    assert!(entry.is_available());
}

#[test]
fn sync_config_updates_known_agents_in_place() {
    let mut registry = registry();
    let record = cookied(&mut registry, "a1");
    registry.update_runtime_info(&record, 10).unwrap();

    registry.sync_config(&[agent_config("a1", &["docker"])]);

    let entry = registry.get("a1").unwrap();
    assert!(entry.config.resources.contains("docker"));
    assert_eq!(entry.status(), AgentRuntimeStatus::Idle);
    assert_eq!(registry.configs().len(), 1);
}
