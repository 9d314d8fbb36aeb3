//! Shared harness for the specs: an in-process coordinator and agents.

pub use dv_core::{BuildCause, JobResult, JobState, StageResult};
pub use std::time::Duration;

use dv_agent::channel::{SessionChannel, WsConnector};
use dv_agent::controller::{AgentController, ControllerParts, TickOutcome};
pub use dv_agent::identity::AgentIdentity;
use dv_agent::identity::FileIdentity;
use dv_agent::test_support::{FakePlugins, RecordingUploader};
use dv_agent::upgrade::NoUpgrade;
use dv_agent::AgentError;
use dv_core::{AgentIdentifier, SystemClock};
use dv_server::{BuildUrls, Coordinator, CoordinatorSettings, Listener, LoadedConfig, AGENT_PATH};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const WAIT_LIMIT: Duration = Duration::from_secs(15);

/// A coordinator listening on an ephemeral localhost port.
pub struct Server {
    pub coordinator: Arc<Coordinator<SystemClock>>,
    pub url: String,
    task: JoinHandle<()>,
}

impl Server {
    pub async fn start(config: &str) -> Self {
        let loaded = LoadedConfig::parse(config, Path::new("drover.toml")).unwrap();
        let settings = CoordinatorSettings {
            urls: BuildUrls {
                console_base: "http://127.0.0.1/console".to_string(),
                artifact_base: "http://127.0.0.1/files".to_string(),
            },
            lost_contact_after: Duration::from_secs(60),
            auto_register: true,
        };
        let coordinator = Arc::new(Coordinator::new(SystemClock, loaded, settings));
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}{}", tcp.local_addr().unwrap(), AGENT_PATH);
        let task = tokio::spawn(Listener::new(tcp, Arc::clone(&coordinator)).run());
        Self { coordinator, url, task }
    }

    pub fn trigger(&self, pipeline: &str) -> i64 {
        self.coordinator.trigger(pipeline, BuildCause::manual("spec")).unwrap().id
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A real agent with its state in a temporary directory.
pub struct Agent {
    pub controller: Arc<AgentController>,
    pub identity: Arc<FileIdentity>,
    dispatcher: JoinHandle<()>,
    _dir: TempDir,
}

impl Agent {
    pub fn start(url: &str) -> Self {
        Self::start_in(url, tempfile::tempdir().unwrap())
    }

    /// An agent whose identity file names `uuid`.
    pub fn with_uuid(url: &str, uuid: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("guid.txt"), uuid).unwrap();
        Self::start_in(url, dir)
    }

    fn start_in(url: &str, dir: TempDir) -> Self {
        let identity = Arc::new(FileIdentity::load(dir.path()).unwrap());
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).unwrap();

        let (dispatch, inbound) = mpsc::unbounded_channel();
        let channel = Arc::new(
            SessionChannel::new(WsConnector::new(url), identity.clone(), dispatch)
                .with_ack_timeout(Some(Duration::from_secs(5))),
        );
        let identifier = AgentIdentifier::new("spec-host", "127.0.0.1", identity.uuid());
        let controller = Arc::new(AgentController::new(
            ControllerParts {
                identifier,
                identity: identity.clone(),
                channel,
                upgrade: Arc::new(NoUpgrade),
                plugins: Arc::new(FakePlugins::default()),
                uploader: Arc::new(RecordingUploader::default()),
                working_dir: work_dir,
            },
            tokio::runtime::Handle::current(),
        ));
        controller.init().unwrap();
        let dispatcher = controller.spawn_dispatcher(inbound);
        Self { controller, identity, dispatcher, _dir: dir }
    }

    pub fn uuid(&self) -> String {
        self.identity.uuid().to_string()
    }

    pub async fn tick(&self) -> Result<TickOutcome, AgentError> {
        self.controller.tick().await
    }

    /// Tick until `check` holds, panicking with `what` after the wait limit.
    pub async fn until(&self, what: &str, mut check: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        while tokio::time::Instant::now() < deadline {
            if check() {
                return;
            }
            let _ = self.tick().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("timed out waiting for {}", what);
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}
