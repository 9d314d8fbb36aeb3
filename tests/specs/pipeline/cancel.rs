//! Cancellation specs
//!
//! Verify that cancelling a running job stops it on its agent.

use crate::prelude::*;

const SLOW: &str = r#"
[[pipelines]]
name = "slow"

[[pipelines.stages]]
name = "wait"

[[pipelines.stages.jobs]]
name = "sleeper"

[[pipelines.stages.jobs.tasks]]
type = "exec"
command = "sleep"
args = ["30"]
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_job_stops_on_its_agent() {
    let server = Server::start(SLOW).await;
    let agent = Agent::start(&server.url);
    agent.tick().await.unwrap();

    let run = server.trigger("slow");
    let job_id = server.coordinator.pipeline(run).unwrap().stages[0].jobs[0].id;
    agent
        .until("job to start building", || {
            server.coordinator.job(job_id).is_some_and(|j| j.state == JobState::Building)
        })
        .await;

    server.coordinator.cancel_job(job_id).unwrap();

    let job = server.coordinator.job(job_id).unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result, JobResult::Cancelled);
    agent.until("agent to go idle", || !agent.controller.runtime_record().is_building()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_a_waiting_job_needs_no_agent() {
    let server = Server::start(SLOW).await;

    let run = server.trigger("slow");
    server.coordinator.cancel_stage(run, "wait").unwrap();

    let stage = server.coordinator.pipeline(run).unwrap().stages[0].clone();
    assert_eq!(stage.result(), StageResult::Cancelled);
}
