// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for agent websocket connections.
//!
//! Each accepted connection is upgraded on `/agent`, authenticated from its
//! handshake headers and attached to the coordinator. Frames are pumped in
//! both directions until either side closes or the session is replaced.

use std::sync::Arc;

use dv_core::Clock;
use dv_wire::{decode, encode, Message, ProtocolError};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as Frame};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::coordinator::Coordinator;
use crate::registry::RegistryError;

pub const AGENT_PATH: &str = "/agent";
pub const AGENT_UUID_HEADER: &str = "x-agent-uuid";

/// Listener task for accepting agent connections.
pub struct Listener<C: Clock> {
    tcp: TcpListener,
    coordinator: Arc<Coordinator<C>>,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub(crate) enum ConnectionError {
    #[error("Websocket error: {0}")]
    Ws(#[from] WsError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Who a handshake admitted.
struct Admitted {
    uuid: String,
    token: Option<String>,
}

impl<C: Clock> Listener<C> {
    pub fn new(tcp: TcpListener, coordinator: Arc<Coordinator<C>>) -> Self {
        Self { tcp, coordinator }
    }

    /// Run the accept loop, spawning a task per connection.
    pub async fn run(self) {
        loop {
            match self.tcp.accept().await {
                Ok((stream, addr)) => {
                    debug!("TCP connection from {}", addr);
                    let coordinator = Arc::clone(&self.coordinator);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &coordinator).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("TCP accept error: {}", e),
            }
        }
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Ws(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
            debug!("Agent disconnected")
        }
        ConnectionError::Ws(WsError::Http(response)) => {
            info!(status = %response.status(), "Agent handshake refused")
        }
        _ => error!("Connection error: {}", e),
    }
}

async fn handle_connection<C: Clock>(
    stream: TcpStream,
    coordinator: &Coordinator<C>,
) -> Result<(), ConnectionError> {
    let mut admitted = None;
    let socket = tokio_tungstenite::accept_hdr_async(stream, |request: &Request, response: Response| {
        let agent = admit(request, coordinator)?;
        admitted = Some(agent);
        Ok(response)
    })
    .await?;
    let Some(Admitted { uuid, token }) = admitted else {
        return Ok(());
    };

    let (tx, outbound) = mpsc::unbounded_channel();
    let session = coordinator.attach(&uuid, token, tx);
    let result = pump(socket, outbound, &uuid, coordinator).await;
    coordinator.detach(&uuid, session);
    result
}

/// Check the upgrade request: path, agent uuid and bearer token.
fn admit<C: Clock>(request: &Request, coordinator: &Coordinator<C>) -> Result<Admitted, ErrorResponse> {
    if request.uri().path() != AGENT_PATH {
        return Err(refuse(StatusCode::NOT_FOUND, format!("no endpoint at {}", request.uri().path())));
    }
    let header = |name: &str| request.headers().get(name).and_then(|v| v.to_str().ok());
    let Some(uuid) = header(AGENT_UUID_HEADER).filter(|u| !u.is_empty()) else {
        return Err(refuse(StatusCode::UNAUTHORIZED, "missing agent uuid".to_string()));
    };
    let token = header("authorization").and_then(|v| v.strip_prefix("Bearer ")).map(str::to_string);

    match coordinator.authenticate(uuid, token.as_deref()) {
        Ok(()) => Ok(Admitted { uuid: uuid.to_string(), token }),
        Err(e) => {
            warn!(agent_uuid = %uuid, error = %e, "agent refused");
            let status = match e {
                RegistryError::MissingCredential(_) => StatusCode::UNAUTHORIZED,
                _ => StatusCode::FORBIDDEN,
            };
            Err(refuse(status, e.to_string()))
        }
    }
}

fn refuse(status: StatusCode, message: String) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message));
    *response.status_mut() = status;
    response
}

/// Move frames between the socket and the coordinator. Returns when the
/// agent closes or the session's sender is dropped.
async fn pump<C: Clock>(
    socket: WebSocketStream<TcpStream>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    uuid: &str,
    coordinator: &Coordinator<C>,
) -> Result<(), ConnectionError> {
    let (mut writer, mut reader) = socket.split();
    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else {
                    debug!(agent_uuid = %uuid, "session replaced, closing");
                    let _ = writer.send(Frame::Close(None)).await;
                    return Ok(());
                };
                let text = encode(&message)?;
                writer.send(Frame::Text(text.into())).await?;
            }
            frame = reader.next() => {
                match frame {
                    Some(Ok(Frame::Text(text))) => match decode(&text) {
                        Ok(message) => coordinator.handle(uuid, message),
                        Err(e) => warn!(agent_uuid = %uuid, error = %e, "undecodable frame"),
                    },
                    Some(Ok(Frame::Binary(data))) => {
                        warn!(agent_uuid = %uuid, error = %ProtocolError::BinaryFrame(data.len()), "ignoring frame");
                    }
                    Some(Ok(Frame::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
