// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::action::Action;
use crate::payload::{BuildSettings, ConsoleOut, Report, WorkAssignment};
use crate::wire::ProtocolError;
use dv_core::AckId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The wire unit of the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<AckId>,
}

impl Message {
    /// A message with no payload.
    pub fn new(action: Action) -> Self {
        Self { action, data: None, ack_id: None }
    }

    pub fn with_data<T: Serialize>(action: Action, data: &T) -> Result<Self, ProtocolError> {
        Ok(Self { action, data: Some(serde_json::to_value(data)?), ack_id: None })
    }

    pub fn ping(report: &Report) -> Result<Self, ProtocolError> {
        Self::with_data(Action::Ping, report)
    }

    pub fn set_cookie(cookie: &str) -> Result<Self, ProtocolError> {
        Self::with_data(Action::SetCookie, &cookie)
    }

    pub fn assign_work(work: &WorkAssignment) -> Result<Self, ProtocolError> {
        Self::with_data(Action::AssignWork, work)
    }

    pub fn build(settings: &BuildSettings) -> Result<Self, ProtocolError> {
        Self::with_data(Action::Build, settings)
    }

    pub fn cancel_build() -> Self {
        Self::new(Action::CancelBuild)
    }

    pub fn reregister() -> Self {
        Self::new(Action::Reregister)
    }

    pub fn console_out(out: &ConsoleOut) -> Result<Self, ProtocolError> {
        Self::with_data(Action::ConsoleOut, out)
    }

    pub fn report_current_status(report: &Report) -> Result<Self, ProtocolError> {
        Self::with_data(Action::ReportCurrentStatus, report)
    }

    pub fn report_completed(report: &Report) -> Result<Self, ProtocolError> {
        Self::with_data(Action::ReportCompleted, report)
    }

    /// Completes the callback registered under `id`.
    pub fn ack(id: &AckId) -> Result<Self, ProtocolError> {
        Self::with_data(Action::Ack, id)
    }

    /// Releases a sender blocked on `id`.
    pub fn acknowledge(id: &AckId) -> Result<Self, ProtocolError> {
        Self::with_data(Action::Acknowledge, id)
    }

    /// Decode the payload as `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let data = self.data.clone().ok_or(ProtocolError::MissingData(self.action))?;
        Ok(serde_json::from_value(data)?)
    }

    /// Id carried in the payload of an `ack` or `acknowledge`.
    pub fn acknowledged_id(&self) -> Option<AckId> {
        match self.action {
            Action::Ack | Action::Acknowledge => self.data_as().ok(),
            _ => None,
        }
    }

    /// Ensure this message carries an acknowledgement id, generating one if
    /// absent, and return it.
    pub fn ensure_ack_id(&mut self) -> Result<AckId, ProtocolError> {
        if !self.action.may_request_ack() {
            return Err(ProtocolError::AckNotAllowed(self.action));
        }
        Ok(self.ack_id.get_or_insert_with(AckId::new).clone())
    }

    pub fn requires_ack(&self) -> bool {
        self.ack_id.is_some()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
