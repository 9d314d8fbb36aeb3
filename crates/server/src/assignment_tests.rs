// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dv_core::test_support::{agent_config, job_plan};
use dv_core::{
    ArtifactKind, ArtifactPlan, BuildCause, FakeClock, JobConfig, JobState, PipelineConfig,
    Resources, StageConfig,
};
use dv_scheduler::{InstanceFactory, SchedulingContext};

fn locator() -> JobLocator {
    JobLocator {
        pipeline: "up42".to_string(),
        pipeline_counter: 3,
        pipeline_label: "v3".to_string(),
        stage: "dev".to_string(),
        stage_counter: 1,
        job: "unit".to_string(),
    }
}

fn history_with(jobs: Vec<JobConfig>, agents: Vec<AgentConfig>) -> JobHistory {
    let pipeline = PipelineConfig::new("up42", vec![StageConfig::new("dev", jobs)]);
    let instance = InstanceFactory::new(FakeClock::new())
        .create_pipeline_instance(
            &pipeline,
            BuildCause::manual("admin"),
            &SchedulingContext::new("admin", agents),
            "cfg",
        )
        .unwrap();
    let mut history = JobHistory::new();
    history.save_pipeline(instance);
    history
}

#[test]
fn agent_with_superset_of_resources_gets_work() {
    let history = history_with(
        vec![JobConfig::new("unit").resources(Resources::new(["linux"]))],
        Vec::new(),
    );

    let agent = agent_config("a1", &["linux", "docker"]);
    assert_eq!(find_work(&history, &agent).map(|j| j.name.as_str()), Some("unit"));
}

#[test]
fn agent_missing_a_resource_gets_nothing() {
    let history = history_with(
        vec![JobConfig::new("unit").resources(Resources::new(["linux", "java"]))],
        Vec::new(),
    );

    assert!(find_work(&history, &agent_config("a1", &["linux"])).is_none());
}

#[test]
fn disabled_agent_gets_nothing() {
    let history = history_with(vec![JobConfig::new("unit")], Vec::new());
    let mut agent = agent_config("a1", &[]);
    agent.disabled = true;

    assert!(find_work(&history, &agent).is_none());
}

#[test]
fn pinned_instances_only_go_to_their_agent() {
    let agents = vec![agent_config("a1", &[]), agent_config("a2", &[])];
    let history = history_with(vec![JobConfig::new("unit").run_on_all_agents(true)], agents);

    let for_a2 = find_work(&history, &agent_config("a2", &[])).unwrap();
    assert_eq!(for_a2.agent_uuid.as_deref(), Some("a2"));
    assert!(find_work(&history, &agent_config("a3", &[])).is_none());
}

#[test]
fn build_command_runs_tasks_between_announcement_and_uploads() {
    let mut plan = job_plan("unit");
    plan.tasks = vec![
        TaskConfig::Echo { text: "hello".to_string() },
        TaskConfig::Exec { command: "make".to_string(), args: vec!["test".to_string()], working_dir: None },
    ];
    plan.artifact_plans = vec![ArtifactPlan {
        source: "target/report.xml".to_string(),
        destination: "reports".to_string(),
        kind: ArtifactKind::default(),
    }];
    plan.variables.add("GO_STAGE_NAME", "overridden");
    plan.variables.add_secure("TOKEN", "s3cret");

    let BuildCommand::Compose { commands } = build_command(&plan, &locator()) else {
        panic!("expected compose");
    };
    assert_eq!(commands.len(), 3);

    let BuildCommand::Compose { commands: prepare } = &commands[0] else { panic!("prepare") };
    assert_eq!(prepare[0], BuildCommand::echo("[drover] Start to build up42/v3/dev/1/unit"));
    assert!(prepare.contains(&BuildCommand::echo("[drover] setting environment variable TOKEN=********")));

    let BuildCommand::Compose { commands: tasks } = &commands[1] else { panic!("tasks") };
    assert_eq!(tasks[0], BuildCommand::echo("hello"));
    let BuildCommand::Exec { command, args, env, .. } = &tasks[1] else { panic!("exec") };
    assert_eq!(command, "make");
    assert_eq!(args, &vec!["test".to_string()]);
    assert_eq!(env.get("GO_PIPELINE_COUNTER"), Some("3"));
    assert_eq!(env.get("GO_STAGE_NAME"), Some("overridden"));
    assert_eq!(env.get("TOKEN"), Some("s3cret"));

    assert_eq!(commands[2], BuildCommand::compose(vec![BuildCommand::upload_artifact("target/report.xml", "reports")]));
}

#[test]
fn settings_carry_job_id_and_locators() {
    let history = history_with(vec![JobConfig::new("unit")], Vec::new());
    let job = history.scheduled_jobs().next().unwrap();
    let locator = history.locate(job.id).unwrap();
    let urls = BuildUrls {
        console_base: "http://ci:8153/console/".to_string(),
        artifact_base: "http://ci:8153/files".to_string(),
    };

    let settings = build_settings(job, &locator, &urls);

    assert_eq!(settings.build_id, job.id.to_string());
    assert_eq!(settings.build_locator, "up42/1/dev/1/unit");
    assert_eq!(settings.build_locator_for_display, "up42/1/dev/1/unit");
    assert_eq!(settings.console_url, "http://ci:8153/console/up42/1/dev/1/unit");
    assert_eq!(settings.artifact_upload_base_url, format!("http://ci:8153/files/{}", job.id));
    assert_eq!(job.state, JobState::Scheduled);
}
