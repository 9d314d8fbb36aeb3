// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent error taxonomy.
//!
//! Transport failures are retried on the next control-loop tick. Security
//! failures are never retried: they invalidate the agent's credentials and
//! force re-registration.

use crate::artifacts::ArtifactError;
use crate::channel::ChannelError;
use crate::identity::IdentityError;
use dv_wire::ProtocolError;
use thiserror::Error;

/// Certificate or credential rejected by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("security failure: {0}")]
pub struct SecurityError(pub String);

/// Errors surfaced by the agent controller.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("work error: {0}")]
    Work(#[from] WorkError),

    #[error("upgrade check failed: {0}")]
    Upgrade(String),
}

/// Failure while executing a unit of work.
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("report failed: {0}")]
    Report(#[from] ChannelError),

    #[error("agent {0} is not registered with the coordinator")]
    Unregistered(String),

    #[error("work thread panicked or was aborted")]
    Join,
}

/// Whether `err` or anything in its `source()` chain is a [`SecurityError`].
pub fn is_caused_by_security(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.downcast_ref::<SecurityError>().is_some() {
            return true;
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
