// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dv-server: The coordinator.
//!
//! Accepts agent websocket sessions, tracks agents and their cookies,
//! hands scheduled jobs to idle agents and records what they report.

pub mod assignment;
pub mod config;
pub mod coordinator;
pub mod env;
pub mod health;
pub mod history;
pub mod lifecycle;
pub mod listener;
pub mod registry;

pub use assignment::BuildUrls;
pub use config::{ConfigError, LoadedConfig};
pub use coordinator::{Coordinator, CoordinatorError, CoordinatorSettings, SessionId};
pub use health::{HealthState, HealthStateLevel, HealthStateRegistry, HealthStateScope, HealthStateType};
pub use history::{HistoryError, JobHistory, JobLocator};
pub use lifecycle::{startup, Config, LifecycleError, ServerState, StartupResult};
pub use listener::{Listener, AGENT_PATH};
pub use registry::{AgentEntry, AgentRegistry, RegistryError};
