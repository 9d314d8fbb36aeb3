// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session channel: one physical connection to the coordinator.
//!
//! `send` is fire-and-forget. `send_and_wait_for_acknowledgement` blocks
//! until an `acknowledge` carrying the message's ack id comes back, or the
//! channel is torn down. Reconnection belongs to the controller.

mod acks;
mod session;
mod ws;

pub use acks::PendingAcks;
pub use session::{SessionChannel, NO_SESSION};
pub use ws::WsConnector;

use crate::error::SecurityError;
use async_trait::async_trait;
use dv_core::AckId;
use dv_wire::{Message, ProtocolError};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from the session channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not running")]
    NotRunning,

    #[error("channel closed before acknowledgement")]
    Closed,

    #[error("no acknowledgement for {0} within timeout")]
    AckTimeout(AckId),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("rejected by coordinator: {0}")]
    Security(#[from] SecurityError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Raw text frames flowing over one live connection.
///
/// Dropping `outgoing` closes the connection. `incoming` ends when the peer
/// goes away.
pub struct Connection {
    pub outgoing: mpsc::UnboundedSender<String>,
    pub incoming: mpsc::UnboundedReceiver<String>,
}

/// Who the agent claims to be when opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub uuid: String,
    pub token: Option<String>,
}

/// Opens physical connections to the coordinator.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, credentials: &Credentials) -> Result<Connection, ChannelError>;
}

/// Agent-side view of the session channel.
#[async_trait]
pub trait AgentChannel: Send + Sync {
    /// Open the connection. A second call while connected is a no-op.
    async fn start(&self) -> Result<(), ChannelError>;

    /// Close the connection, failing every pending acknowledgement wait.
    fn stop(&self);

    fn is_running(&self) -> bool;

    fn is_not_running(&self) -> bool {
        !self.is_running()
    }

    /// Transmit without waiting.
    fn send(&self, message: Message) -> Result<(), ChannelError>;

    /// Transmit and wait until the coordinator acknowledges the message.
    async fn send_and_wait_for_acknowledgement(&self, message: Message)
        -> Result<(), ChannelError>;

    /// Human-readable session name, `[No Session]` when stopped.
    fn name(&self) -> String;
}
