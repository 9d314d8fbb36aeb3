// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! drover-agent: connects to a coordinator and runs the builds it assigns.

use anyhow::Context;
use clap::Parser;
use dv_agent::artifacts::{ArtifactsRepository, HttpTransport};
use dv_agent::channel::{SessionChannel, WsConnector};
use dv_agent::controller::{AgentController, ControllerParts, TickOutcome};
use dv_agent::env;
use dv_agent::identity::{AgentIdentity, FileIdentity};
use dv_agent::plugins::PluginDirectory;
use dv_agent::upgrade::MarkerFileUpgrade;
use dv_core::AgentIdentifier;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drover-agent", version, about = "drover build agent")]
struct Args {
    /// Coordinator websocket endpoint (overrides DROVER_SERVER_URL)
    #[arg(long)]
    server_url: Option<String>,

    /// Directory for identity, plugins and logs (overrides DROVER_STATE_DIR)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Directory builds run in (defaults to <state-dir>/work)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Hostname reported to the coordinator
    #[arg(long)]
    hostname: Option<String>,

    /// IP address reported to the coordinator
    #[arg(long, default_value = "127.0.0.1")]
    ip_address: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let state_dir = match args.state_dir {
        Some(dir) => dir,
        None => env::state_dir()?,
    };
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("creating {}", state_dir.display()))?;
    let _log_guard = init_tracing(&state_dir);

    let work_dir = args.work_dir.unwrap_or_else(|| state_dir.join("work"));
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("creating {}", work_dir.display()))?;

    let identity = Arc::new(FileIdentity::load(&state_dir)?);
    let hostname = args
        .hostname
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string());
    let identifier = AgentIdentifier::new(hostname, args.ip_address, identity.uuid());

    let server_url = args.server_url.unwrap_or_else(env::server_url);
    let (dispatch, inbound) = mpsc::unbounded_channel();
    let channel = Arc::new(
        SessionChannel::new(WsConnector::new(&server_url), identity.clone(), dispatch)
            .with_ack_timeout(env::ack_timeout()),
    );
    let runtime = tokio::runtime::Handle::current();
    let uploader = Arc::new(ArtifactsRepository::new(
        HttpTransport::new(),
        env::artifact_url(),
        env::upload_attempts(),
        runtime.clone(),
    ));

    let controller = Arc::new(AgentController::new(
        ControllerParts {
            identifier: identifier.clone(),
            identity,
            channel,
            upgrade: Arc::new(MarkerFileUpgrade::new(&state_dir)),
            plugins: Arc::new(PluginDirectory::new(state_dir.join("plugins"), env::plugin_bundle())),
            uploader,
            working_dir: work_dir,
        },
        runtime,
    ));
    controller.init()?;
    let dispatcher = controller.spawn_dispatcher(inbound);
    tracing::info!(agent = %identifier, %server_url, "agent started");

    let mut interval = tokio::time::interval(env::tick_interval());
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match controller.tick().await {
                    Ok(TickOutcome::Pinged) => {}
                    Ok(TickOutcome::UpgradeRequired { version }) => {
                        tracing::info!(%version, "exiting for upgrade");
                        break;
                    }
                    Err(e) => tracing::warn!(error = %e, "control loop tick failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    dispatcher.abort();
    controller.wait_for_current_work().await;
    Ok(())
}

/// Log to stderr and to `agent.log` in the state directory.
fn init_tracing(state_dir: &Path) -> WorkerGuard {
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(state_dir, "agent.log"));
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    guard
}
