// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator lifecycle: startup, configuration reload, shutdown.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use dv_core::Clock;
use fs2::FileExt;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{ConfigError, LoadedConfig};
use crate::coordinator::{Coordinator, CoordinatorSettings};
use crate::env::{listen_addr, state_dir};

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/drover-server)
    pub state_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to server log file
    pub log_path: PathBuf,
    /// Pipeline and agent configuration
    pub config_path: PathBuf,
    /// Address of the agent endpoint
    pub listen_addr: String,
}

impl Config {
    /// Paths under the resolved state directory.
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self::in_dir(state_dir()?, listen_addr()))
    }

    pub fn in_dir(state_dir: PathBuf, listen_addr: String) -> Self {
        Self {
            lock_path: state_dir.join("server.pid"),
            log_path: state_dir.join("server.log"),
            config_path: state_dir.join("drover.toml"),
            state_dir,
            listen_addr,
        }
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: server already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server state during operation.
pub struct ServerState<C: Clock> {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub coordinator: Arc<Coordinator<C>>,
}

/// Result of startup: the server state and the bound agent endpoint.
pub struct StartupResult<C: Clock> {
    pub server: ServerState<C>,
    pub listener: TcpListener,
}

/// Start the coordinator.
pub async fn startup<C: Clock>(
    config: &Config,
    clock: C,
    settings: CoordinatorSettings,
) -> Result<StartupResult<C>, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Open without truncating so a running server's PID survives a failed lock.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    let loaded = if config.config_path.exists() {
        LoadedConfig::load(&config.config_path)?
    } else {
        warn!(path = %config.config_path.display(), "no configuration file, starting empty");
        LoadedConfig::parse("", &config.config_path)?
    };
    info!(version = %loaded.version, pipelines = loaded.config.pipelines.len(), "configuration loaded");
    let coordinator = Arc::new(Coordinator::new(clock, loaded, settings));

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.listen_addr.clone(), e))?;
    info!(addr = %listener.local_addr()?, "agent endpoint listening");

    Ok(StartupResult {
        server: ServerState { config: config.clone(), lock_file, coordinator },
        listener,
    })
}

impl<C: Clock> ServerState<C> {
    /// Re-read the configuration file. A file that fails to load leaves the
    /// current configuration in place and raises a health error.
    pub fn reload_config(&self) -> Result<(), ConfigError> {
        match LoadedConfig::load(&self.config.config_path) {
            Ok(loaded) => {
                self.coordinator.reload_config(loaded);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "configuration reload failed");
                self.coordinator.config_invalid(&e);
                Err(e)
            }
        }
    }

    pub fn shutdown(&self) {
        info!("Shutting down server...");
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!("Failed to remove PID file: {}", e);
            }
        }
        info!("Server shutdown complete");
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
