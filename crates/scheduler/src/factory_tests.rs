// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dv_core::test_support::agent_config;
use dv_core::{
    ApprovalType, ClusterProfile, ElasticProfile, FakeClock, JobState, Resources,
};
use std::collections::BTreeMap;

fn factory() -> InstanceFactory<FakeClock> {
    InstanceFactory::new(FakeClock::new())
}

fn vars(pairs: &[(&str, &str)]) -> EnvironmentVariables {
    pairs.iter().copied().collect()
}

fn three_agents() -> SchedulingContext {
    SchedulingContext::new(
        "loser",
        vec![
            agent_config("abcd1234", &["foobar"]),
            agent_config("1234abcd", &["baz", "foobar"]),
            agent_config("7890abdc", &["crapyagent"]),
        ],
    )
}

fn cruise() -> PipelineConfig {
    PipelineConfig::new(
        "cruise",
        vec![
            StageConfig::new("first", vec![JobConfig::new("unit"), JobConfig::new("functional")]),
            StageConfig::new("second", vec![JobConfig::new("deploy")]),
        ],
    )
}

#[test]
fn stage_instance_records_config_version() {
    let stage = factory()
        .create_stage_instance_for(&cruise(), "first", &SchedulingContext::default(), "md5-test")
        .unwrap();
    assert_eq!(stage.config_version, "md5-test");
    assert_eq!(stage.id, UNPERSISTED_ID);
    assert_eq!(stage.counter, 1);
    assert!(stage.latest_run);
    assert_eq!(stage.rerun_of_counter, None);
}

#[test]
fn unknown_stage_names_pipeline_and_stage() {
    let err = factory()
        .create_stage_instance_for(
            &cruise(),
            "doesNotExist",
            &SchedulingContext::default(),
            "md5-test",
        )
        .unwrap_err();
    assert_eq!(err.to_string(), "Stage 'doesNotExist' not found in pipeline 'cruise'");
}

#[test]
fn stage_instance_expands_every_job_in_config_order() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42_000);
    let stage = InstanceFactory::new(clock)
        .create_stage_instance_for(&cruise(), "first", &SchedulingContext::default(), "md5-test")
        .unwrap();
    assert_eq!(stage.name, "first");
    assert_eq!(stage.job_names(), vec!["unit", "functional"]);
    assert_eq!(stage.created_at_ms, 42_000);
    for job in &stage.jobs {
        assert_eq!(job.state, JobState::Scheduled);
        assert_eq!(job.transitions.len(), 1);
        assert_eq!(job.transition_time(JobState::Scheduled), Some(42_000));
        assert_eq!(job.agent_uuid, None);
    }
}

#[test]
fn stage_instance_copies_approval_and_fetch_materials() {
    let config = StageConfig::new("manual", vec![JobConfig::new("unit")])
        .approval(ApprovalType::Manual)
        .fetch_materials(false);
    let stage = factory()
        .create_stage_instance(&config, &SchedulingContext::new("joe", vec![]), "md5-test")
        .unwrap();
    assert_eq!(stage.approval_type, ApprovalType::Manual);
    assert!(!stage.fetch_materials);
    assert!(!stage.jobs[0].plan.fetch_materials);
    assert_eq!(stage.approved_by, "joe");
}

#[test]
fn job_plan_sees_only_job_variables_without_outer_scopes() {
    let job = JobConfig::new("unit").environment_variables(vars(&[("JOB_VAR", "job")]));
    let plan = factory().create_job_plan(&job, &SchedulingContext::default());
    assert_eq!(plan.variables, vars(&[("JOB_VAR", "job")]));
}

#[test]
fn job_plan_variables_override_by_scope() {
    let pipeline = PipelineConfig::new(
        "cruise",
        vec![StageConfig::new(
            "first",
            vec![JobConfig::new("unit").environment_variables(vars(&[
                ("SHARED", "job"),
                ("JOB_ONLY", "j"),
            ]))],
        )
        .environment_variables(vars(&[("SHARED", "stage"), ("STAGE_ONLY", "s")]))],
    )
    .environment_variables(vars(&[("SHARED", "pipeline"), ("PIPELINE_ONLY", "p")]));

    let stage = factory()
        .create_stage_instance_for(&pipeline, "first", &SchedulingContext::default(), "v")
        .unwrap();
    let plan = &stage.jobs[0].plan;
    assert_eq!(plan.variables.get("SHARED"), Some("job"));
    assert_eq!(plan.variables.get("PIPELINE_ONLY"), Some("p"));
    assert_eq!(plan.variables.get("STAGE_ONLY"), Some("s"));
    assert_eq!(plan.variables.get("JOB_ONLY"), Some("j"));
    assert_eq!(plan.variables.len(), 4);
}

#[test]
fn job_plan_overrides_context_variables() {
    let ctx = SchedulingContext::default()
        .override_environment_variables(&vars(&[("A", "ctx"), ("B", "ctx")]));
    let job = JobConfig::new("unit").environment_variables(vars(&[("B", "job"), ("C", "job")]));
    let plan = factory().create_job_plan(&job, &ctx);
    assert_eq!(plan.variables.to_pairs(), vec![
        ("A".to_string(), "ctx".to_string()),
        ("B".to_string(), "job".to_string()),
        ("C".to_string(), "job".to_string()),
    ]);
}

#[test]
fn pipeline_instance_schedules_first_stage_only() {
    let pipeline = factory()
        .create_pipeline_instance(
            &cruise(),
            BuildCause::manual("joe"),
            &SchedulingContext::default(),
            "md5-test",
        )
        .unwrap();
    assert_eq!(pipeline.stages.len(), 1);
    assert_eq!(pipeline.stages[0].name, "first");
    assert_eq!(pipeline.id, UNPERSISTED_ID);
}

#[test]
fn pipeline_without_stages_is_rejected() {
    let err = factory()
        .create_pipeline_instance(
            &PipelineConfig::new("empty", vec![]),
            BuildCause::manual("joe"),
            &SchedulingContext::default(),
            "v",
        )
        .unwrap_err();
    assert_eq!(err, ScheduleError::EmptyPipeline("empty".to_string()));
}

#[test]
fn build_cause_variables_override_pipeline_variables_in_label_and_plans() {
    let pipeline = cruise()
        .label_template("${ENV:VAR}")
        .environment_variables(vars(&[("VAR", "value")]));
    let cause = BuildCause::manual("joe").with_variables(vars(&[("VAR", "overriddenValue")]));

    let mut instance = factory()
        .create_pipeline_instance(&pipeline, cause, &SchedulingContext::default(), "v")
        .unwrap();
    crate::update_counter(&mut instance, 1);

    assert_eq!(instance.label, "overriddenValue");
    assert_eq!(instance.counter, 1);
    assert_eq!(instance.stages[0].jobs[0].plan.variables.get("VAR"), Some("overriddenValue"));
}

#[test]
fn job_plan_resolves_elastic_and_cluster_profiles() {
    let elastic = ElasticProfile {
        id: "docker".to_string(),
        plugin_id: "cd.go.docker".to_string(),
        cluster_profile_id: "local".to_string(),
        properties: BTreeMap::from([("Image".to_string(), "alpine".to_string())]),
    };
    let cluster = ClusterProfile {
        id: "local".to_string(),
        plugin_id: "cd.go.docker".to_string(),
        properties: BTreeMap::new(),
    };
    let ctx = SchedulingContext::default().with_profiles(vec![elastic.clone()], vec![cluster.clone()]);

    let plan = factory().create_job_plan(&JobConfig::new("unit").elastic_profile_id("docker"), &ctx);
    assert_eq!(plan.elastic_profile, Some(elastic));
    assert_eq!(plan.cluster_profile, Some(cluster));

    let plain = factory().create_job_plan(&JobConfig::new("unit"), &ctx);
    assert_eq!(plain.elastic_profile, None);
    assert_eq!(plain.cluster_profile, None);
}

#[test]
fn unknown_elastic_profile_leaves_plan_unprofiled() {
    let plan = factory().create_job_plan(
        &JobConfig::new("unit").elastic_profile_id("missing"),
        &SchedulingContext::default(),
    );
    assert_eq!(plan.elastic_profile, None);
    assert_eq!(plan.cluster_profile, None);
}

#[test]
fn each_run_type_uses_its_own_name_generator() {
    let config = StageConfig::new(
        "dev",
        vec![
            JobConfig::new("rails").resources(Resources::new(["foobar"])).run_on_all_agents(true),
            JobConfig::new("java").run_instance_count(2u32),
            JobConfig::new("html"),
        ],
    );
    let stage = factory().create_stage_instance(&config, &three_agents(), "v").unwrap();
    assert_eq!(stage.job_names(), vec![
        "rails-runOnAll-1",
        "rails-runOnAll-2",
        "java-runInstance-1",
        "java-runInstance-2",
        "html",
    ]);
    assert!(stage.jobs[0].run_on_all_agents);
    assert!(stage.jobs[2].run_multiple_instance);
    assert!(!stage.jobs[4].run_on_all_agents && !stage.jobs[4].run_multiple_instance);
}

#[test]
fn run_on_all_pins_each_instance_to_a_matching_agent() {
    let job = JobConfig::new("rails").resources(Resources::new(["foobar"])).run_on_all_agents(true);
    let jobs = factory().create_job_instances("dev", &job, &three_agents()).unwrap();
    let pinned: Vec<(&str, Option<&str>)> =
        jobs.iter().map(|j| (j.name.as_str(), j.agent_uuid.as_deref())).collect();
    assert_eq!(pinned, vec![
        ("rails-runOnAll-1", Some("abcd1234")),
        ("rails-runOnAll-2", Some("1234abcd")),
    ]);
}

#[test]
fn run_on_all_without_matching_agents_fails() {
    let job = JobConfig::new("rails").resources(Resources::new(["nope"])).run_on_all_agents(true);
    let err = factory().create_job_instances("dev", &job, &three_agents()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Could not find matching agents to run job [rails] of stage [dev]."
    );
}

#[test]
fn run_multiple_injects_index_and_count() {
    let job = JobConfig::new("java")
        .run_instance_count(3u32)
        .environment_variables(vars(&[("OWN", "x")]));
    let jobs = factory().create_job_instances("dev", &job, &SchedulingContext::default()).unwrap();
    assert_eq!(jobs.len(), 3);
    for (i, job) in jobs.iter().enumerate() {
        let index = (i + 1).to_string();
        assert_eq!(job.plan.variables.get(GO_JOB_RUN_INDEX), Some(index.as_str()));
        assert_eq!(job.plan.variables.get(GO_JOB_RUN_COUNT), Some("3"));
        assert_eq!(job.plan.variables.get("OWN"), Some("x"));
        assert_eq!(job.plan.job_name, "java");
    }
}
