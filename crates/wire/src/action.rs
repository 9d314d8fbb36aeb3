// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Protocol action carried by every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    /// Agent heartbeat carrying its runtime record.
    Ping,
    /// Coordinator issues the agent's cookie.
    SetCookie,
    /// Coordinator hands over a unit of work.
    AssignWork,
    /// Coordinator hands over a build in build-command form.
    Build,
    /// Coordinator asks the agent to cancel its current build.
    CancelBuild,
    /// Coordinator asks the agent to drop its identity and register again.
    Reregister,
    ConsoleOut,
    ReportCurrentStatus,
    ReportCompleted,
    /// Completes a callback registered with `send_with_callback`.
    Ack,
    /// Resolves a blocking send waiting on the carried id.
    Acknowledge,
}

dv_core::simple_display! {
    Action {
        Ping => "ping",
        SetCookie => "setCookie",
        AssignWork => "assignWork",
        Build => "build",
        CancelBuild => "cancelBuild",
        Reregister => "reregister",
        ConsoleOut => "consoleOut",
        ReportCurrentStatus => "reportCurrentStatus",
        ReportCompleted => "reportCompleted",
        Ack => "ack",
        Acknowledge => "acknowledge",
    }
}

impl Action {
    /// Whether a message with this action may carry its own acknowledgement id.
    pub fn may_request_ack(self) -> bool {
        !matches!(self, Self::Ack | Self::Acknowledge)
    }
}
