// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes for the agent's seams.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::artifacts::{ArtifactError, ArtifactUploader, ConsoleSink};
use crate::channel::{AgentChannel, ChannelError, Connection, Connector, Credentials};
use crate::error::SecurityError;
use crate::identity::{AgentIdentity, IdentityError};
use crate::plugins::{PluginError, PluginInfrastructure};
use crate::runner::CancelFlag;
use crate::subprocess::SubprocessLogger;
use crate::work::{BuildPublisher, WorkContext};
use async_trait::async_trait;
use dv_core::{AgentIdentifier, AgentRuntimeRecord};
use dv_wire::{Message, Property, Report};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

// ── Identity ────────────────────────────────────────────────────────────

/// In-memory identity that counts calls.
#[derive(Debug)]
pub struct FakeIdentity {
    uuid: String,
    registered: AtomicBool,
    pub registrations: AtomicUsize,
    pub invalidations: AtomicUsize,
    pub ssl_setups: AtomicUsize,
}

impl FakeIdentity {
    pub fn new(uuid: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            registered: AtomicBool::new(false),
            registrations: AtomicUsize::new(0),
            invalidations: AtomicUsize::new(0),
            ssl_setups: AtomicUsize::new(0),
        }
    }

    pub fn registered(uuid: &str) -> Self {
        let identity = Self::new(uuid);
        identity.registered.store(true, Ordering::SeqCst);
        identity
    }

    pub fn invalidation_count(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }

    pub fn registration_count(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

impl AgentIdentity for FakeIdentity {
    fn uuid(&self) -> &str {
        &self.uuid
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    fn register_if_necessary(&self, _identifier: &AgentIdentifier) -> Result<(), IdentityError> {
        if !self.registered.swap(true, Ordering::SeqCst) {
            self.registrations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn invalidate_agent_certificate(&self) {
        self.registered.store(false, Ordering::SeqCst);
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }

    fn create_ssl_infrastructure(&self) -> Result<(), IdentityError> {
        self.ssl_setups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn credentials(&self) -> Credentials {
        Credentials {
            uuid: self.uuid.clone(),
            token: self.is_registered().then(|| format!("token-{}", self.uuid)),
        }
    }
}

// ── Channel ─────────────────────────────────────────────────────────────

/// How a [`FakeChannel`] delivered a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Plain(Message),
    AwaitingAck(Message),
}

impl Sent {
    pub fn message(&self) -> &Message {
        match self {
            Sent::Plain(m) | Sent::AwaitingAck(m) => m,
        }
    }
}

/// Why the next [`FakeChannel::start`] fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartFailure {
    Security(String),
    Connect(String),
}

/// Channel that records traffic and acknowledges every wait immediately.
#[derive(Debug, Default)]
pub struct FakeChannel {
    running: AtomicBool,
    sent: Mutex<Vec<Sent>>,
    fail_start: Mutex<Option<StartFailure>>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running() -> Self {
        let channel = Self::new();
        channel.running.store(true, Ordering::SeqCst);
        channel
    }

    pub fn fail_next_start(&self, failure: StartFailure) {
        *self.fail_start.lock() = Some(failure);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.sent.lock().iter().map(|s| s.message().clone()).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentChannel for FakeChannel {
    async fn start(&self) -> Result<(), ChannelError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        match self.fail_start.lock().take() {
            Some(StartFailure::Security(reason)) => Err(SecurityError(reason).into()),
            Some(StartFailure::Connect(reason)) => Err(ChannelError::Connect(reason)),
            None => {
                self.running.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn send(&self, message: Message) -> Result<(), ChannelError> {
        if !self.is_running() {
            return Err(ChannelError::NotRunning);
        }
        self.sent.lock().push(Sent::Plain(message));
        Ok(())
    }

    async fn send_and_wait_for_acknowledgement(
        &self,
        mut message: Message,
    ) -> Result<(), ChannelError> {
        if !self.is_running() {
            return Err(ChannelError::NotRunning);
        }
        message.ensure_ack_id()?;
        self.sent.lock().push(Sent::AwaitingAck(message));
        Ok(())
    }

    fn name(&self) -> String {
        if self.is_running() {
            "fake-session".to_string()
        } else {
            crate::channel::NO_SESSION.to_string()
        }
    }
}

// ── In-memory connector ─────────────────────────────────────────────────

/// Coordinator end of a connection opened by [`MemoryConnector`].
pub struct MemoryPeer {
    pub credentials: Credentials,
    to_agent: mpsc::UnboundedSender<String>,
    from_agent: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    pub fn send(&self, message: &Message) {
        let _ = self.to_agent.send(dv_wire::encode(message).unwrap_or_default());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.to_agent.send(text.to_string());
    }

    /// Next decoded message from the agent, `None` once it hangs up.
    pub async fn recv(&mut self) -> Option<Message> {
        let text = self.from_agent.recv().await?;
        dv_wire::decode(&text).ok()
    }

    /// Drop the connection from the coordinator side.
    pub fn close(self) {}
}

/// Connector whose connections are in-process channel pairs.
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    reject: Mutex<Option<String>>,
}

impl MemoryConnector {
    /// The connector plus the stream of peers it hands out.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { peers: tx, reject: Mutex::new(None) }, rx)
    }

    /// Refuse the next connection as a security failure.
    pub fn reject_next(&self, reason: &str) {
        *self.reject.lock() = Some(reason.to_string());
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Connection, ChannelError> {
        if let Some(reason) = self.reject.lock().take() {
            return Err(SecurityError(reason).into());
        }
        let (to_peer, from_agent) = mpsc::unbounded_channel();
        let (to_agent, incoming) = mpsc::unbounded_channel();
        let peer = MemoryPeer { credentials: credentials.clone(), to_agent, from_agent };
        self.peers.send(peer).map_err(|_| ChannelError::Connect("no peer listening".into()))?;
        Ok(Connection { outgoing: to_peer, incoming })
    }
}

// ── Plugins ─────────────────────────────────────────────────────────────

/// Plugin infrastructure that counts calls and optionally fails to start.
#[derive(Debug, Default)]
pub struct FakePlugins {
    pub fail_start: bool,
    pub unpacked: AtomicUsize,
    pub started: AtomicUsize,
    pub listening: AtomicUsize,
}

impl FakePlugins {
    pub fn failing() -> Self {
        Self { fail_start: true, ..Self::default() }
    }
}

impl PluginInfrastructure for FakePlugins {
    fn unpack_bundle(&self) {
        self.unpacked.fetch_add(1, Ordering::SeqCst);
    }

    fn start_infrastructure(&self) -> Result<(), PluginError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(PluginError::Io {
                path: PathBuf::from("plugins"),
                source: std::io::Error::other("disk full"),
            });
        }
        Ok(())
    }

    fn register_plugins_folder_change_listener(&self) -> Result<(), PluginError> {
        self.listening.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Work sinks ──────────────────────────────────────────────────────────

/// What a [`RecordingPublisher`] saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Published {
    Console { build_id: String, line: String },
    Status(Report),
    Completed(Report),
    Property(Property),
}

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Published>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Published> {
        self.events.lock().clone()
    }

    pub fn console_lines(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Published::Console { line, .. } => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn completed(&self) -> Vec<Report> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Published::Completed(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<Report> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Published::Status(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn property(&self, name: &str) -> Option<String> {
        self.events.lock().iter().rev().find_map(|e| match e {
            Published::Property(p) if p.name == name => Some(p.value.clone()),
            _ => None,
        })
    }
}

impl BuildPublisher for RecordingPublisher {
    fn console(&self, build_id: &str, line: &str) {
        self.events
            .lock()
            .push(Published::Console { build_id: build_id.to_string(), line: line.to_string() });
    }

    fn report_current_status(&self, report: Report) -> Result<(), ChannelError> {
        self.events.lock().push(Published::Status(report));
        Ok(())
    }

    fn report_completed(&self, report: Report) -> Result<(), ChannelError> {
        self.events.lock().push(Published::Completed(report));
        Ok(())
    }

    fn set_property(&self, property: Property) {
        self.events.lock().push(Published::Property(property));
    }
}

/// Uploader that records `(source, dest, build_id)` and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingUploader {
    pub uploads: Mutex<Vec<(PathBuf, String, String)>>,
}

impl ArtifactUploader for RecordingUploader {
    fn upload_blocking(
        &self,
        _console: &dyn ConsoleSink,
        source: &Path,
        dest: &str,
        build_id: &str,
    ) -> Result<(), ArtifactError> {
        self.uploads.lock().push((source.to_path_buf(), dest.to_string(), build_id.to_string()));
        Ok(())
    }
}

/// A context over fresh fakes, rooted at `working_dir`.
pub fn work_context(
    publisher: Arc<RecordingPublisher>,
    working_dir: impl Into<PathBuf>,
) -> WorkContext {
    let working_dir = working_dir.into();
    WorkContext {
        record: Arc::new(Mutex::new(AgentRuntimeRecord::new(
            AgentIdentifier::new("agent-host", "127.0.0.1", "agent-uuid"),
            working_dir.display().to_string(),
        ))),
        publisher,
        uploader: Arc::new(RecordingUploader::default()),
        subprocesses: Arc::new(SubprocessLogger::new()),
        cancel: CancelFlag::new(),
        working_dir,
    }
}
