// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the coordinator.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: DROVER_SERVER_STATE_DIR > XDG_STATE_HOME/drover-server > ~/.local/state/drover-server
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("DROVER_SERVER_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("drover-server"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/drover-server"))
}

/// Address the agent endpoint listens on.
pub fn listen_addr() -> String {
    std::env::var("DROVER_LISTEN_ADDR")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "127.0.0.1:8153".to_string())
}

/// Silence after which an agent is marked lost (default 5m)
pub fn lost_contact_timeout() -> Duration {
    std::env::var("DROVER_LOST_CONTACT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(300))
}

/// Housekeeping interval (default 5s)
pub fn refresh_interval() -> Duration {
    std::env::var("DROVER_REFRESH_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Base of the console links handed to agents.
pub fn console_url() -> String {
    std::env::var("DROVER_CONSOLE_URL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "http://127.0.0.1:8153/console".to_string())
}

/// Base of the artifact upload links handed to agents.
pub fn artifact_url() -> String {
    std::env::var("DROVER_ARTIFACT_URL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "http://127.0.0.1:8153/files".to_string())
}

/// Whether unknown agents are registered on first heartbeat (default on).
pub fn auto_register() -> bool {
    match std::env::var("DROVER_AUTO_REGISTER") {
        Ok(v) => !matches!(v.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"),
        Err(_) => true,
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
