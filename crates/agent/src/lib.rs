// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dv-agent: The build agent.
//!
//! An agent registers with the coordinator, keeps a session channel open,
//! heartbeats its runtime record and runs at most one unit of work at a time.

pub mod artifacts;
pub mod channel;
pub mod controller;
pub mod env;
pub mod error;
pub mod identity;
pub mod plugins;
pub mod runner;
pub mod subprocess;
pub mod upgrade;
pub mod work;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use artifacts::{ArtifactError, ArtifactUploader, ArtifactsRepository, HttpTransport};
pub use channel::{AgentChannel, ChannelError, SessionChannel, WsConnector, NO_SESSION};
pub use controller::{AgentController, ControllerParts, TickOutcome};
pub use error::{is_caused_by_security, AgentError, SecurityError, WorkError};
pub use identity::{AgentIdentity, FileIdentity};
pub use runner::{CancelFlag, JobRunner, Work};
