// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent/coordinator runtime protocol.
//!
//! Wire format: one JSON object per websocket text frame,
//! `{"action": "<camelCase>", "data": <payload>, "ackId": "<id>"}`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod action;
mod message;
mod payload;
mod wire;

pub use action::Action;
pub use message::Message;
pub use payload::{
    AgentInstruction, BuildCommand, BuildSettings, ConsoleOut, Property, Report, WorkAssignment,
};
pub use wire::{decode, encode, ProtocolError};
