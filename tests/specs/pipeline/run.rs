//! Pipeline run specs
//!
//! Verify that triggered pipelines are built by agents stage by stage.

use crate::prelude::*;

const TWO_STAGES: &str = r#"
[[pipelines]]
name = "hello"
label_template = "1.0.${COUNT}"

[[pipelines.stages]]
name = "build"

[[pipelines.stages.jobs]]
name = "compile"

[[pipelines.stages.jobs.tasks]]
type = "echo"
text = "compiling"

[[pipelines.stages.jobs.tasks]]
type = "exec"
command = "sh"
args = ["-c", "echo pipeline=$GO_PIPELINE_NAME label=$GO_PIPELINE_LABEL"]

[[pipelines.stages]]
name = "ship"

[[pipelines.stages.jobs]]
name = "package"

[[pipelines.stages.jobs.tasks]]
type = "echo"
text = "packaging"
"#;

fn stage_result(server: &Server, pipeline_id: i64, stage: &str) -> Option<StageResult> {
    let run = server.coordinator.pipeline(pipeline_id)?;
    let stage = run.stage(stage)?;
    stage.is_completed().then(|| stage.result())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn passing_stage_runs_the_next_one() {
    let server = Server::start(TWO_STAGES).await;
    let agent = Agent::start(&server.url);
    agent.tick().await.unwrap();

    let run = server.trigger("hello");
    agent.until("ship stage to finish", || stage_result(&server, run, "ship").is_some()).await;

    assert_eq!(stage_result(&server, run, "build"), Some(StageResult::Passed));
    assert_eq!(stage_result(&server, run, "ship"), Some(StageResult::Passed));

    let pipeline = server.coordinator.pipeline(run).unwrap();
    let compile = pipeline.stage("build").unwrap().job("compile").unwrap();
    assert_eq!(compile.agent_uuid, Some(agent.uuid()));

    let console = server.coordinator.console(&compile.id.to_string());
    assert_eq!(console[0], "[drover] Start to build hello/1.0.1/build/1/compile");
    assert!(console.contains(&"compiling".to_string()), "console: {:?}", console);
    assert!(console.contains(&"pipeline=hello label=1.0.1".to_string()), "console: {:?}", console);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_task_fails_the_job_and_stops_the_pipeline() {
    let config = TWO_STAGES.replace(r#"args = ["-c", "echo pipeline"#, r#"args = ["-c", "exit 3; echo pipeline"#);
    let server = Server::start(&config).await;
    let agent = Agent::start(&server.url);
    agent.tick().await.unwrap();

    let run = server.trigger("hello");
    agent.until("build stage to finish", || stage_result(&server, run, "build").is_some()).await;

    assert_eq!(stage_result(&server, run, "build"), Some(StageResult::Failed));
    let pipeline = server.coordinator.pipeline(run).unwrap();
    assert!(pipeline.stage("ship").is_none());

    let compile = pipeline.stage("build").unwrap().job("compile").unwrap();
    assert_eq!(compile.result, JobResult::Failed);
    let console = server.coordinator.console(&compile.id.to_string());
    assert!(console.iter().any(|l| l.contains("'sh' exited with")), "console: {:?}", console);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn manual_stage_waits_until_run() {
    let config = TWO_STAGES.replace("name = \"ship\"\n", "name = \"ship\"\napproval = \"manual\"\n");
    let server = Server::start(&config).await;
    let agent = Agent::start(&server.url);
    agent.tick().await.unwrap();

    let run = server.trigger("hello");
    agent.until("build stage to finish", || stage_result(&server, run, "build").is_some()).await;
    agent.tick().await.unwrap();
    assert!(server.coordinator.pipeline(run).unwrap().stage("ship").is_none());

    server.coordinator.run_stage(run, "ship").unwrap();
    agent.until("ship stage to finish", || stage_result(&server, run, "ship").is_some()).await;
    assert_eq!(stage_result(&server, run, "ship"), Some(StageResult::Passed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rerun_of_a_failed_job_runs_as_a_new_stage_counter() {
    let config = TWO_STAGES.replace(r#"args = ["-c", "echo pipeline"#, r#"args = ["-c", "exit 1; echo pipeline"#);
    let server = Server::start(&config).await;
    let agent = Agent::start(&server.url);
    agent.tick().await.unwrap();

    let run = server.trigger("hello");
    agent.until("build stage to fail", || stage_result(&server, run, "build").is_some()).await;

    let rerun = server.coordinator.rerun_jobs(run, "build", &["compile"], "spec").unwrap();
    assert_eq!(rerun.counter, 2);
    agent
        .until("rerun to finish", || {
            server.coordinator.pipeline(run).unwrap().stage("build").is_some_and(|s| s.counter == 2 && s.is_completed())
        })
        .await;

    let job = server.coordinator.pipeline(run).unwrap().stage("build").unwrap().job("compile").cloned().unwrap();
    assert!(job.is_rerun);
    assert_eq!(job.result, JobResult::Failed);
}
