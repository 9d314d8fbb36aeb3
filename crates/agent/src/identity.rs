// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identity: durable uuid plus the registration credential.

use crate::channel::Credentials;
use dv_core::AgentIdentifier;
use std::path::{Path, PathBuf};
use thiserror::Error;

const GUID_FILE: &str = "guid.txt";
const TOKEN_FILE: &str = "agent.token";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Registration and credential store consulted by the controller.
pub trait AgentIdentity: Send + Sync {
    fn uuid(&self) -> &str;

    fn is_registered(&self) -> bool;

    /// Obtain a credential if the agent does not already hold one.
    fn register_if_necessary(&self, identifier: &AgentIdentifier) -> Result<(), IdentityError>;

    /// Discard the credential so the next tick registers again.
    fn invalidate_agent_certificate(&self);

    fn create_ssl_infrastructure(&self) -> Result<(), IdentityError>;

    fn credentials(&self) -> Credentials;
}

/// Identity kept as two files in the agent's state directory: the uuid in
/// `guid.txt` and the credential in `agent.token`.
#[derive(Debug, Clone)]
pub struct FileIdentity {
    dir: PathBuf,
    uuid: String,
}

impl FileIdentity {
    /// Load the uuid from `dir`, generating and persisting one on first start.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self, IdentityError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        let guid_path = dir.join(GUID_FILE);
        let uuid = match std::fs::read_to_string(&guid_path) {
            Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                let uuid = uuid::Uuid::new_v4().to_string();
                std::fs::write(&guid_path, &uuid).map_err(|e| io_error(&guid_path, e))?;
                tracing::info!(agent_uuid = %uuid, "generated agent uuid");
                uuid
            }
        };
        Ok(Self { dir, uuid })
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    fn token(&self) -> Option<String> {
        std::fs::read_to_string(self.token_path())
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

impl AgentIdentity for FileIdentity {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn is_registered(&self) -> bool {
        self.token().is_some()
    }

    fn register_if_necessary(&self, identifier: &AgentIdentifier) -> Result<(), IdentityError> {
        if self.is_registered() {
            return Ok(());
        }
        let path = self.token_path();
        std::fs::write(&path, nanoid::nanoid!()).map_err(|e| io_error(&path, e))?;
        tracing::info!(agent = %identifier, "agent registered");
        Ok(())
    }

    fn invalidate_agent_certificate(&self) {
        match std::fs::remove_file(self.token_path()) {
            Ok(()) => tracing::warn!(agent_uuid = %self.uuid, "agent credential invalidated"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(agent_uuid = %self.uuid, error = %e, "failed to invalidate credential"),
        }
    }

    fn create_ssl_infrastructure(&self) -> Result<(), IdentityError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))
    }

    fn credentials(&self) -> Credentials {
        Credentials { uuid: self.uuid.clone(), token: self.token() }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> IdentityError {
    IdentityError::Io { path: path.to_path_buf(), source }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
