// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{AgentChannel, ChannelError, Connector, PendingAcks};
use crate::identity::AgentIdentity;
use async_trait::async_trait;
use dv_core::short;
use dv_wire::{Action, Message};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Name reported by a channel with no live connection.
pub const NO_SESSION: &str = "[No Session]";

struct Live {
    generation: u64,
    name: String,
    outgoing: mpsc::UnboundedSender<String>,
    receive: Option<JoinHandle<()>>,
}

/// Session channel over any [`Connector`].
///
/// Inbound `acknowledge` messages resolve pending waits. Everything else,
/// including acknowledgements nobody is waiting on, goes to `dispatch` for
/// the controller's `process`.
pub struct SessionChannel<K: Connector> {
    connector: K,
    identity: Arc<dyn AgentIdentity>,
    acks: PendingAcks,
    dispatch: mpsc::UnboundedSender<Message>,
    ack_timeout: Option<Duration>,
    starting: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    live: Arc<Mutex<Option<Live>>>,
}

impl<K: Connector> SessionChannel<K> {
    pub fn new(
        connector: K,
        identity: Arc<dyn AgentIdentity>,
        dispatch: mpsc::UnboundedSender<Message>,
    ) -> Self {
        Self {
            connector,
            identity,
            acks: PendingAcks::new(),
            dispatch,
            ack_timeout: None,
            starting: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            live: Arc::new(Mutex::new(None)),
        }
    }

    /// Fail acknowledgement waits that take longer than `timeout`.
    pub fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn pending_acks(&self) -> usize {
        self.acks.len()
    }
}

#[async_trait]
impl<K: Connector> AgentChannel for SessionChannel<K> {
    async fn start(&self) -> Result<(), ChannelError> {
        let _starting = self.starting.lock().await;
        if self.is_running() {
            return Ok(());
        }

        let credentials = self.identity.credentials();
        let connection = self.connector.connect(&credentials).await?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!("session-{}-{}", short(&credentials.uuid, 8), generation);

        *self.live.lock() = Some(Live {
            generation,
            name: name.clone(),
            outgoing: connection.outgoing,
            receive: None,
        });
        let handle = tokio::spawn(receive_loop(
            connection.incoming,
            self.acks.clone(),
            self.dispatch.clone(),
            Arc::clone(&self.live),
            generation,
        ));
        if let Some(live) = self.live.lock().as_mut().filter(|l| l.generation == generation) {
            live.receive = Some(handle);
        }

        info!(session = %name, "session channel started");
        Ok(())
    }

    fn stop(&self) {
        let Some(live) = self.live.lock().take() else {
            return;
        };
        if let Some(receive) = live.receive {
            receive.abort();
        }
        let failed = self.acks.fail_all();
        info!(session = %live.name, failed_acks = failed, "session channel stopped");
    }

    fn is_running(&self) -> bool {
        self.live.lock().as_ref().is_some_and(|l| !l.outgoing.is_closed())
    }

    fn send(&self, message: Message) -> Result<(), ChannelError> {
        let text = dv_wire::encode(&message)?;
        let live = self.live.lock();
        let live = live.as_ref().ok_or(ChannelError::NotRunning)?;
        debug!(session = %live.name, action = %message.action, "send");
        live.outgoing.send(text).map_err(|_| ChannelError::NotRunning)
    }

    async fn send_and_wait_for_acknowledgement(
        &self,
        mut message: Message,
    ) -> Result<(), ChannelError> {
        let id = message.ensure_ack_id()?;
        let waiter = self.acks.register(id.clone());
        if let Err(e) = self.send(message) {
            self.acks.forget(&id);
            return Err(e);
        }

        match self.ack_timeout {
            None => waiter.await.map_err(|_| ChannelError::Closed),
            Some(timeout) => match tokio::time::timeout(timeout, waiter).await {
                Ok(result) => result.map_err(|_| ChannelError::Closed),
                Err(_) => {
                    self.acks.forget(&id);
                    warn!(ack_id = %id, "acknowledgement timed out");
                    Err(ChannelError::AckTimeout(id))
                }
            },
        }
    }

    fn name(&self) -> String {
        self.live.lock().as_ref().map_or_else(|| NO_SESSION.to_string(), |l| l.name.clone())
    }
}

async fn receive_loop(
    mut incoming: mpsc::UnboundedReceiver<String>,
    acks: PendingAcks,
    dispatch: mpsc::UnboundedSender<Message>,
    live: Arc<Mutex<Option<Live>>>,
    generation: u64,
) {
    while let Some(text) = incoming.recv().await {
        let message = match dv_wire::decode(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                continue;
            }
        };
        if message.action == Action::Acknowledge {
            if let Some(id) = message.acknowledged_id() {
                if acks.resolve(&id) {
                    debug!(ack_id = %id, "acknowledged");
                    continue;
                }
            }
        }
        if dispatch.send(message).is_err() {
            warn!("dispatcher gone, closing session");
            break;
        }
    }

    let mut live = live.lock();
    if live.as_ref().is_some_and(|l| l.generation == generation) {
        let closed = live.take();
        drop(live);
        let failed = acks.fail_all();
        if let Some(closed) = closed {
            info!(session = %closed.name, failed_acks = failed, "session channel closed by peer");
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
