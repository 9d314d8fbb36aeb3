// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin folder: bundled plugins are unpacked into it at startup and it is
//! watched for changes afterwards.

use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin folder {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("watching plugin folder: {0}")]
    Watch(#[from] notify::Error),
}

/// Started once during controller init. Failures never abort startup.
pub trait PluginInfrastructure: Send + Sync {
    /// Unpack bundled plugins. Errors are logged, never returned.
    fn unpack_bundle(&self);

    fn start_infrastructure(&self) -> Result<(), PluginError>;

    fn register_plugins_folder_change_listener(&self) -> Result<(), PluginError>;
}

/// Plugins are files in one directory, optionally seeded from a bundle dir.
pub struct PluginDirectory {
    dir: PathBuf,
    bundle: Option<PathBuf>,
    plugins: Arc<Mutex<Vec<String>>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl PluginDirectory {
    pub fn new(dir: impl Into<PathBuf>, bundle: Option<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            bundle,
            plugins: Arc::new(Mutex::new(Vec::new())),
            watcher: Mutex::new(None),
        }
    }

    /// File names of the loaded plugins, sorted.
    pub fn plugins(&self) -> Vec<String> {
        self.plugins.lock().clone()
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    fn copy_bundle(&self, bundle: &Path) -> Result<usize, PluginError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let mut copied = 0;
        for entry in std::fs::read_dir(bundle).map_err(|e| io_error(bundle, e))? {
            let path = entry.map_err(|e| io_error(bundle, e))?.path();
            let Some(name) = path.file_name().filter(|_| path.is_file()) else {
                continue;
            };
            let target = self.dir.join(name);
            std::fs::copy(&path, &target).map_err(|e| io_error(&target, e))?;
            copied += 1;
        }
        Ok(copied)
    }
}

impl PluginInfrastructure for PluginDirectory {
    fn unpack_bundle(&self) {
        let Some(bundle) = &self.bundle else {
            return;
        };
        match self.copy_bundle(bundle) {
            Ok(copied) => tracing::info!(copied, bundle = %bundle.display(), "bundled plugins unpacked"),
            Err(e) => tracing::error!(error = %e, "failed to unpack bundled plugins"),
        }
    }

    fn start_infrastructure(&self) -> Result<(), PluginError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let found = scan(&self.dir)?;
        tracing::info!(plugins = found.len(), dir = %self.dir.display(), "plugin infrastructure started");
        *self.plugins.lock() = found;
        Ok(())
    }

    fn register_plugins_folder_change_listener(&self) -> Result<(), PluginError> {
        let dir = self.dir.clone();
        let plugins = Arc::clone(&self.plugins);
        let mut watcher = notify::recommended_watcher(move |res: Result<NotifyEvent, _>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
                    match scan(&dir) {
                        Ok(found) => *plugins.lock() = found,
                        Err(e) => tracing::warn!(error = %e, "plugin rescan failed"),
                    }
                }
            }
        })?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        *self.watcher.lock() = Some(watcher);
        Ok(())
    }
}

fn scan(dir: &Path) -> Result<Vec<String>, PluginError> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
        let path = entry.map_err(|e| io_error(dir, e))?.path();
        if path.is_file() {
            if let Some(name) = path.file_name() {
                found.push(name.to_string_lossy().into_owned());
            }
        }
    }
    found.sort();
    Ok(found)
}

fn io_error(path: &Path, source: std::io::Error) -> PluginError {
    PluginError::Io { path: path.to_path_buf(), source }
}

#[cfg(test)]
#[path = "plugins_tests.rs"]
mod tests;
