// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Websocket connector: bridges a tungstenite stream to a [`Connection`].

use super::{ChannelError, Connection, Connector, Credentials};
use crate::error::SecurityError;
use async_trait::async_trait;
use dv_wire::ProtocolError;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

pub const AGENT_UUID_HEADER: &str = "x-agent-uuid";

/// Connects to the coordinator's agent endpoint, e.g. `ws://host:8153/agent`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Connection, ChannelError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::Connect(format!("{}: {}", self.url, e)))?;
        let headers = request.headers_mut();
        headers.insert(AGENT_UUID_HEADER, header_value(&credentials.uuid)?);
        if let Some(token) = &credentials.token {
            headers.insert("authorization", header_value(&format!("Bearer {}", token))?);
        }

        let (stream, _) = tokio_tungstenite::connect_async(request).await.map_err(|e| match e {
            WsError::Http(response)
                if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
            {
                ChannelError::Security(SecurityError(format!(
                    "{} refused agent {} ({})",
                    self.url,
                    credentials.uuid,
                    response.status()
                )))
            }
            e => ChannelError::Connect(format!("{}: {}", self.url, e)),
        })?;

        tracing::debug!(url = %self.url, "websocket connected");
        Ok(bridge(stream))
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ChannelError> {
    HeaderValue::from_str(value).map_err(|e| ChannelError::Connect(e.to_string()))
}

/// Pump frames between a websocket and a pair of text channels. Dropping the
/// returned `outgoing` sender closes the socket.
pub fn bridge<S>(stream: tokio_tungstenite::WebSocketStream<S>) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (to_socket, mut from_agent) = mpsc::unbounded_channel::<String>();
    let (to_agent, incoming) = mpsc::unbounded_channel::<String>();
    let (mut writer, mut reader) = stream.split();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                outgoing = from_agent.recv() => {
                    let Some(text) = outgoing else {
                        let _ = writer.send(Message::Close(None)).await;
                        break;
                    };
                    if writer.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                frame = reader.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            if to_agent.send(text.to_string()).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            tracing::warn!(error = %ProtocolError::BinaryFrame(data.len()), "ignoring frame");
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "websocket error");
                            break;
                        }
                        _ => {} // Ping/Pong
                    }
                }
            }
        }
        tracing::debug!("websocket bridge closed");
    });

    Connection { outgoing: to_socket, incoming }
}
