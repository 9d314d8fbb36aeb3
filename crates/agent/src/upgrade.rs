// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Upgrade check run at the top of every control-loop tick.

use async_trait::async_trait;
use std::path::PathBuf;

pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const MARKER_FILE: &str = "upgrade.version";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeCheck {
    UpToDate,
    Required { version: String },
}

#[async_trait]
pub trait UpgradeService: Send + Sync {
    async fn check_for_upgrade(&self) -> Result<UpgradeCheck, String>;
}

/// Never asks for an upgrade.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoUpgrade;

#[async_trait]
impl UpgradeService for NoUpgrade {
    async fn check_for_upgrade(&self) -> Result<UpgradeCheck, String> {
        Ok(UpgradeCheck::UpToDate)
    }
}

/// Requests an upgrade when `upgrade.version` in the state directory names a
/// version other than the running one.
#[derive(Debug, Clone)]
pub struct MarkerFileUpgrade {
    path: PathBuf,
    current: String,
}

impl MarkerFileUpgrade {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self { path: state_dir.into().join(MARKER_FILE), current: AGENT_VERSION.to_string() }
    }

    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current = version.into();
        self
    }
}

#[async_trait]
impl UpgradeService for MarkerFileUpgrade {
    async fn check_for_upgrade(&self) -> Result<UpgradeCheck, String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) => {
                let wanted = s.trim();
                if wanted.is_empty() || wanted == self.current {
                    Ok(UpgradeCheck::UpToDate)
                } else {
                    Ok(UpgradeCheck::Required { version: wanted.to_string() })
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UpgradeCheck::UpToDate),
            Err(e) => Err(format!("{}: {}", self.path.display(), e)),
        }
    }
}

#[cfg(test)]
#[path = "upgrade_tests.rs"]
mod tests;
