// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identity and the runtime record mirrored between agent and coordinator.
//!
//! The runtime record is owned by the agent process. It is mutated locally as
//! work starts, gets cancelled and finishes, and a copy travels with every
//! heartbeat and status report so the coordinator can mirror it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable identity of one agent process.
///
/// The uuid is the durable identity. Hostname and IP address are
/// informational and may change across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentifier {
    pub hostname: String,
    pub ip_address: String,
    pub uuid: String,
}

impl AgentIdentifier {
    pub fn new(
        hostname: impl Into<String>,
        ip_address: impl Into<String>,
        uuid: impl Into<String>,
    ) -> Self {
        Self { hostname: hostname.into(), ip_address: ip_address.into(), uuid: uuid.into() }
    }
}

impl fmt::Display for AgentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Agent [{}, {}, {}]", self.hostname, self.ip_address, self.uuid)
    }
}

/// Live status of an agent as seen by the agent itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRuntimeStatus {
    #[default]
    Unknown,
    Idle,
    Building,
    /// Transient overlay of `Building` while the running work winds down.
    Cancelled,
    LostContact,
    Missing,
    Disabled,
}

crate::simple_display! {
    AgentRuntimeStatus {
        Unknown => "Unknown",
        Idle => "Idle",
        Building => "Building",
        Cancelled => "Cancelled",
        LostContact => "LostContact",
        Missing => "Missing",
        Disabled => "Disabled",
    }
}

impl AgentRuntimeStatus {
    /// True while a job runner may still be active for this agent.
    pub fn is_building(self) -> bool {
        matches!(self, Self::Building | Self::Cancelled)
    }

    /// Statuses for which the last reported disk space is no longer trusted.
    pub fn is_out_of_contact(self) -> bool {
        matches!(self, Self::LostContact | Self::Missing)
    }
}

/// Which build an agent is working on, for display and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentBuildingInfo {
    /// Human-readable `pipeline/counter/stage/counter/job` locator.
    pub build_info: String,
    /// Machine locator used for console and artifact URLs.
    pub build_locator: String,
}

impl AgentBuildingInfo {
    pub fn new(build_info: impl Into<String>, build_locator: impl Into<String>) -> Self {
        Self { build_info: build_info.into(), build_locator: build_locator.into() }
    }
}

/// Text rendered for disk space that is not known.
pub const UNKNOWN_SPACE: &str = "Unknown";

/// Authoritative snapshot of one agent's state.
///
/// Invariant: `building_info` is `Some` exactly when the status is
/// `Building` or `Cancelled`. Cancellation moves `Building -> Cancelled`,
/// and only [`AgentRuntimeRecord::idle`] returns the record to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRuntimeRecord {
    pub identifier: AgentIdentifier,
    status: AgentRuntimeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    building_info: Option<AgentBuildingInfo>,
    /// Free bytes in the agent's working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usable_space: Option<u64>,
    #[serde(default)]
    pub operating_system: String,
    /// Working directory of the agent process.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub supports_build_command_protocol: bool,
}

impl AgentRuntimeRecord {
    /// A record for a freshly started agent, before its first heartbeat.
    pub fn new(identifier: AgentIdentifier, location: impl Into<String>) -> Self {
        Self {
            identifier,
            status: AgentRuntimeStatus::Unknown,
            cookie: None,
            building_info: None,
            usable_space: None,
            operating_system: std::env::consts::OS.to_string(),
            location: location.into(),
            supports_build_command_protocol: true,
        }
    }

    pub fn uuid(&self) -> &str {
        &self.identifier.uuid
    }

    pub fn status(&self) -> AgentRuntimeStatus {
        self.status
    }

    pub fn cookie(&self) -> Option<&str> {
        self.cookie.as_deref()
    }

    pub fn building_info(&self) -> Option<&AgentBuildingInfo> {
        self.building_info.as_ref()
    }

    pub fn set_cookie(&mut self, cookie: impl Into<String>) {
        self.cookie = Some(cookie.into());
    }

    pub fn clear_cookie(&mut self) {
        self.cookie = None;
    }

    /// Whether `other` claims this agent's uuid while holding a different cookie.
    pub fn is_duplicate_of(&self, other: &AgentRuntimeRecord) -> bool {
        match (&self.cookie, &other.cookie) {
            (Some(mine), Some(theirs)) => mine != theirs,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Mark the agent as building `info`.
    pub fn busy(&mut self, info: AgentBuildingInfo) {
        self.status = AgentRuntimeStatus::Building;
        self.building_info = Some(info);
    }

    /// Overlay `Cancelled` on a running build. No-op unless building.
    pub fn cancel(&mut self) {
        if self.status == AgentRuntimeStatus::Building {
            self.status = AgentRuntimeStatus::Cancelled;
        }
    }

    /// Return to `Idle`, dropping any building info.
    pub fn idle(&mut self) {
        self.status = AgentRuntimeStatus::Idle;
        self.building_info = None;
    }

    /// A connected agent with no build running is `Idle`.
    pub fn ready(&mut self) {
        if !self.is_building() {
            self.idle();
        }
    }

    /// Coordinator-side status changes that do not involve a running build.
    ///
    /// Setting `Building` or `Cancelled` this way is ignored; use
    /// [`busy`](Self::busy) and [`cancel`](Self::cancel).
    pub fn set_status(&mut self, status: AgentRuntimeStatus) {
        if status.is_building() {
            return;
        }
        self.status = status;
        self.building_info = None;
    }

    pub fn is_building(&self) -> bool {
        self.status.is_building()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == AgentRuntimeStatus::Cancelled
    }

    /// Usable space formatted for humans, or `Unknown` when it cannot be trusted.
    pub fn human_readable_usable_space(&self) -> String {
        match self.usable_space {
            Some(bytes) if !self.status.is_out_of_contact() => human_readable_size(bytes),
            _ => UNKNOWN_SPACE.to_string(),
        }
    }
}

/// Format a byte count with a binary unit suffix, e.g. `1.5 GB`.
pub fn human_readable_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["bytes", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} bytes", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
