// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator-side view of every agent it knows about.
//!
//! An agent binds its credential on first connect. Its first heartbeat gets
//! a cookie, and every later heartbeat must carry that cookie: a different
//! one means a second process is running with the same uuid.

use dv_core::{
    AgentBuildingInfo, AgentConfig, AgentIdentifier, AgentRuntimeRecord, AgentRuntimeStatus,
};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("agent {0} presented no credential")]
    MissingCredential(String),

    #[error("agent {0} presented a credential that does not match its registration")]
    CredentialMismatch(String),

    #[error("Agent [{0}] has no cookie set")]
    NoCookie(String),

    #[error("Agent [{0}] has invalid cookie")]
    DuplicateAgent(String),

    #[error("agent {0} is not registered")]
    Unregistered(String),
}

/// One known agent.
#[derive(Debug, Clone)]
pub struct AgentEntry {
    pub config: AgentConfig,
    /// Last runtime record received, with the coordinator's cookie.
    pub record: AgentRuntimeRecord,
    pub last_heard_ms: Option<u64>,
    token: Option<String>,
}

impl AgentEntry {
    fn new(config: AgentConfig) -> Self {
        let identifier =
            AgentIdentifier::new(config.hostname.clone(), config.ip_address.clone(), config.uuid.clone());
        Self { record: AgentRuntimeRecord::new(identifier, ""), config, last_heard_ms: None, token: None }
    }

    pub fn uuid(&self) -> &str {
        &self.config.uuid
    }

    pub fn cookie(&self) -> Option<&str> {
        self.record.cookie()
    }

    /// Runtime status, with the operator's disable taking precedence.
    pub fn status(&self) -> AgentRuntimeStatus {
        if self.config.disabled {
            AgentRuntimeStatus::Disabled
        } else {
            self.record.status()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.disabled
    }

    /// Idle and enabled: eligible for new work.
    pub fn is_available(&self) -> bool {
        self.is_enabled() && self.record.status() == AgentRuntimeStatus::Idle
    }
}

pub struct AgentRegistry {
    agents: BTreeMap<String, AgentEntry>,
    auto_register: bool,
    lost_contact_after: Duration,
}

impl AgentRegistry {
    pub fn new(lost_contact_after: Duration) -> Self {
        Self { agents: BTreeMap::new(), auto_register: true, lost_contact_after }
    }

    /// Whether unknown agents are admitted on their first heartbeat.
    pub fn with_auto_register(mut self, auto_register: bool) -> Self {
        self.auto_register = auto_register;
        self
    }

    /// Apply the configured agent list. New entries start out `Missing`
    /// until heard from; configured fields replace those of known agents.
    pub fn sync_config(&mut self, configs: &[AgentConfig]) {
        for config in configs {
            match self.agents.get_mut(&config.uuid) {
                Some(entry) => entry.config = config.clone(),
                None => {
                    let mut entry = AgentEntry::new(config.clone());
                    entry.record.set_status(AgentRuntimeStatus::Missing);
                    self.agents.insert(config.uuid.clone(), entry);
                }
            }
        }
    }

    /// Check the credential an agent connects with. The first credential
    /// seen for a uuid is bound to it.
    pub fn authenticate(&mut self, uuid: &str, token: Option<&str>) -> Result<(), RegistryError> {
        let token = token.filter(|t| !t.is_empty()).ok_or_else(|| RegistryError::MissingCredential(uuid.to_string()))?;
        let Some(entry) = self.agents.get_mut(uuid) else {
            // Unknown agents are admitted to the socket; the first heartbeat
            // decides whether they get registered.
            return Ok(());
        };
        match &entry.token {
            Some(bound) if bound != token => Err(RegistryError::CredentialMismatch(uuid.to_string())),
            Some(_) => Ok(()),
            None => {
                entry.token = Some(token.to_string());
                Ok(())
            }
        }
    }

    /// Register an agent on its first heartbeat. Returns false when the
    /// agent is unknown and auto-registration is off.
    pub fn register_if_allowed(&mut self, identifier: &AgentIdentifier, token: Option<&str>) -> bool {
        if self.agents.contains_key(&identifier.uuid) {
            return true;
        }
        if !self.auto_register {
            return false;
        }
        let config = AgentConfig::new(&identifier.uuid, &identifier.hostname, &identifier.ip_address);
        let mut entry = AgentEntry::new(config);
        entry.token = token.map(str::to_string);
        self.agents.insert(identifier.uuid.clone(), entry);
        tracing::info!(agent = %identifier, "agent registered");
        true
    }

    pub fn is_registered(&self, uuid: &str) -> bool {
        self.agents.contains_key(uuid)
    }

    /// Issue a fresh cookie for `uuid`, replacing any previous one.
    pub fn assign_cookie(&mut self, uuid: &str) -> Result<String, RegistryError> {
        let entry = self.entry_mut(uuid)?;
        let cookie = uuid::Uuid::new_v4().to_string();
        entry.record.set_cookie(&cookie);
        tracing::info!(agent_uuid = %uuid, "cookie assigned");
        Ok(cookie)
    }

    /// Store a heartbeat. The record must carry the cookie this registry
    /// issued for its uuid.
    pub fn update_runtime_info(
        &mut self,
        record: &AgentRuntimeRecord,
        now_ms: u64,
    ) -> Result<(), RegistryError> {
        let uuid = record.uuid().to_string();
        let entry = self.entry_mut(&uuid)?;
        if record.cookie().is_none() {
            tracing::warn!(agent = %record.identifier, "agent has no cookie set");
            return Err(RegistryError::NoCookie(uuid));
        }
        if entry.record.is_duplicate_of(record) {
            tracing::warn!(agent = %record.identifier, "found agent with duplicate uuid");
            return Err(RegistryError::DuplicateAgent(uuid));
        }
        if entry.record.status().is_out_of_contact() {
            tracing::info!(agent = %record.identifier, "agent back in contact");
        }
        entry.record = record.clone();
        entry.last_heard_ms = Some(now_ms);
        Ok(())
    }

    /// Mark the agent as building, as the coordinator assigns it work.
    pub fn building(&mut self, uuid: &str, info: AgentBuildingInfo) -> Result<(), RegistryError> {
        self.entry_mut(uuid)?.record.busy(info);
        Ok(())
    }

    /// Free the agent once it reports its build complete.
    pub fn finished(&mut self, uuid: &str) -> Result<(), RegistryError> {
        self.entry_mut(uuid)?.record.idle();
        Ok(())
    }

    pub fn enable(&mut self, uuid: &str) -> Result<(), RegistryError> {
        self.entry_mut(uuid)?.config.disabled = false;
        Ok(())
    }

    pub fn disable(&mut self, uuid: &str) -> Result<(), RegistryError> {
        self.entry_mut(uuid)?.config.disabled = true;
        tracing::info!(agent_uuid = %uuid, "agent disabled");
        Ok(())
    }

    /// Age out agents that have gone quiet. Returns the uuids that lost
    /// contact on this pass.
    pub fn refresh(&mut self, now_ms: u64) -> Vec<String> {
        let limit = self.lost_contact_after.as_millis() as u64;
        let mut lost = Vec::new();
        for entry in self.agents.values_mut() {
            let status = entry.record.status();
            match entry.last_heard_ms {
                None if status != AgentRuntimeStatus::Missing => {
                    entry.record.set_status(AgentRuntimeStatus::Missing);
                }
                Some(heard)
                    if now_ms.saturating_sub(heard) > limit
                        && status != AgentRuntimeStatus::LostContact =>
                {
                    tracing::warn!(agent = %entry.record.identifier, "agent lost contact");
                    entry.record.set_status(AgentRuntimeStatus::LostContact);
                    lost.push(entry.uuid().to_string());
                }
                _ => {}
            }
        }
        lost
    }

    pub fn get(&self, uuid: &str) -> Option<&AgentEntry> {
        self.agents.get(uuid)
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentEntry> {
        self.agents.values()
    }

    /// Configuration of every known agent, for scheduling contexts.
    pub fn configs(&self) -> Vec<AgentConfig> {
        self.agents.values().map(|e| e.config.clone()).collect()
    }

    fn entry_mut(&mut self, uuid: &str) -> Result<&mut AgentEntry, RegistryError> {
        self.agents.get_mut(uuid).ok_or_else(|| RegistryError::Unregistered(uuid.to_string()))
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
