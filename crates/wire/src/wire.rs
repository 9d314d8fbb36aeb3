// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Text frame encoding.

use crate::action::Action;
use crate::message::Message;
use thiserror::Error;

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message '{0}' carries no data")]
    MissingData(Action),

    #[error("message '{0}' cannot request an acknowledgement")]
    AckNotAllowed(Action),

    #[error("unexpected binary frame of {0} bytes")]
    BinaryFrame(usize),
}

/// Encode a message as a JSON text frame.
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode a JSON text frame.
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
