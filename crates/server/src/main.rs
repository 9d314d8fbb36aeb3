// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! drover-server: the coordinator agents connect to.

use anyhow::Context;
use clap::Parser;
use dv_core::SystemClock;
use dv_server::{env, startup, BuildUrls, Config, CoordinatorSettings, Listener};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drover-server", version, about = "drover coordinator")]
struct Args {
    /// Directory for the lock, log and default configuration (overrides DROVER_SERVER_STATE_DIR)
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Configuration file (defaults to <state-dir>/drover.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Agent endpoint address (overrides DROVER_LISTEN_ADDR)
    #[arg(long)]
    listen: Option<String>,

    /// Refuse agents that are not in the configuration
    #[arg(long)]
    no_auto_register: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = match args.state_dir {
        Some(dir) => Config::in_dir(dir, env::listen_addr()),
        None => Config::load()?,
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(path) = args.config {
        config.config_path = path;
    }
    std::fs::create_dir_all(&config.state_dir)
        .with_context(|| format!("creating {}", config.state_dir.display()))?;
    let _log_guard = init_tracing(&config.log_path);

    let settings = CoordinatorSettings {
        urls: BuildUrls { console_base: env::console_url(), artifact_base: env::artifact_url() },
        lost_contact_after: env::lost_contact_timeout(),
        auto_register: env::auto_register() && !args.no_auto_register,
    };
    let started = startup(&config, SystemClock, settings).await?;
    let server = started.server;
    let listener = tokio::spawn(Listener::new(started.listener, server.coordinator.clone()).run());
    tracing::info!(addr = %config.listen_addr, config = %config.config_path.display(), "server started");

    let mut interval = tokio::time::interval(env::refresh_interval());
    loop {
        tokio::select! {
            _ = interval.tick() => {
                for uuid in server.coordinator.refresh() {
                    tracing::warn!(agent_uuid = %uuid, "agent lost contact");
                }
                if config.config_path.exists() {
                    // Failures are logged and raised as health errors.
                    let _ = server.reload_config();
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    listener.abort();
    server.shutdown();
    Ok(())
}

/// Log to stderr and to `log_path`.
fn init_tracing(log_path: &Path) -> WorkerGuard {
    let dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    let file = log_path.file_name().unwrap_or_else(|| OsStr::new("server.log"));
    let (file_writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();
    guard
}
