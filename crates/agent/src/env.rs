// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the agent.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("cannot resolve state directory: set DROVER_STATE_DIR or HOME")]
pub struct NoStateDir;

/// Resolve state directory: DROVER_STATE_DIR > XDG_STATE_HOME/drover-agent > ~/.local/state/drover-agent
pub fn state_dir() -> Result<PathBuf, NoStateDir> {
    if let Ok(dir) = std::env::var("DROVER_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("drover-agent"));
    }
    let home = std::env::var("HOME").map_err(|_| NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/drover-agent"))
}

/// Coordinator websocket endpoint.
pub fn server_url() -> String {
    std::env::var("DROVER_SERVER_URL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "ws://127.0.0.1:8153/agent".to_string())
}

/// Control-loop interval (default 10s)
pub fn tick_interval() -> Duration {
    std::env::var("DROVER_TICK_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}

/// Acknowledgement wait limit. Unset waits until the session closes.
pub fn ack_timeout() -> Option<Duration> {
    std::env::var("DROVER_ACK_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Base URL of the artifact store.
pub fn artifact_url() -> String {
    std::env::var("DROVER_ARTIFACT_URL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "http://127.0.0.1:8153/files".to_string())
}

/// Attempts per artifact upload (default 3)
pub fn upload_attempts() -> u32 {
    std::env::var("DROVER_UPLOAD_ATTEMPTS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(3)
}

/// Directory of bundled plugins copied into the plugin folder at startup.
pub fn plugin_bundle() -> Option<PathBuf> {
    std::env::var("DROVER_PLUGIN_BUNDLE").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
