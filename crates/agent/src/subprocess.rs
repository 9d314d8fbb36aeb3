// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracks child processes started by build commands.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SHUTDOWN_PREFIX: &str = "Following processes were alive at shutdown: ";

#[derive(Debug, Default)]
pub struct SubprocessLogger {
    alive: Mutex<BTreeMap<u32, String>>,
}

impl SubprocessLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, pid: u32, description: impl Into<String>) {
        self.alive.lock().insert(pid, description.into());
    }

    pub fn unregister(&self, pid: u32) {
        self.alive.lock().remove(&pid);
    }

    /// `(pid, description)` of every tracked process, by pid.
    pub fn alive(&self) -> Vec<(u32, String)> {
        self.alive.lock().iter().map(|(pid, d)| (*pid, d.clone())).collect()
    }

    /// The shutdown line, or `None` when nothing is alive.
    pub fn shutdown_report(&self) -> Option<String> {
        let alive = self.alive.lock();
        if alive.is_empty() {
            return None;
        }
        let survivors: Vec<String> =
            alive.iter().map(|(pid, d)| format!("[pid {}] {}", pid, d)).collect();
        Some(format!("{}{}", SHUTDOWN_PREFIX, survivors.join(", ")))
    }

    /// Log the survivors when the returned hook is dropped.
    pub fn register_as_exit_hook(self: &Arc<Self>) -> ExitHook {
        ExitHook { logger: Arc::clone(self) }
    }
}

/// Reports surviving subprocesses on drop.
#[derive(Debug)]
pub struct ExitHook {
    logger: Arc<SubprocessLogger>,
}

impl Drop for ExitHook {
    fn drop(&mut self) {
        if let Some(report) = self.logger.shutdown_report() {
            tracing::warn!("{}", report);
        }
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
