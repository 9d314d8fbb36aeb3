// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work kinds executed by the job runner and the sinks they report through.

mod build;
mod sleep;

pub use build::BuildWork;
pub use sleep::SleepWork;

use crate::artifacts::{ArtifactUploader, ConsoleSink};
use crate::channel::{AgentChannel, ChannelError};
use crate::error::WorkError;
use crate::runner::{CancelFlag, Work};
use crate::subprocess::SubprocessLogger;
use dv_core::AgentRuntimeRecord;
use dv_wire::{ConsoleOut, Message, Property, Report, WorkAssignment};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Where running work sends console lines, status reports and properties.
///
/// Called from the blocking job thread.
pub trait BuildPublisher: Send + Sync {
    fn console(&self, build_id: &str, line: &str);

    /// Report a state change, waiting for the coordinator's acknowledgement.
    fn report_current_status(&self, report: Report) -> Result<(), ChannelError>;

    /// Report the terminal result, waiting for the coordinator's acknowledgement.
    fn report_completed(&self, report: Report) -> Result<(), ChannelError>;

    fn set_property(&self, property: Property);
}

/// Everything a unit of work may touch while it runs.
#[derive(Clone)]
pub struct WorkContext {
    pub record: Arc<Mutex<AgentRuntimeRecord>>,
    pub publisher: Arc<dyn BuildPublisher>,
    pub uploader: Arc<dyn ArtifactUploader>,
    pub subprocesses: Arc<SubprocessLogger>,
    pub cancel: CancelFlag,
    pub working_dir: PathBuf,
}

impl WorkContext {
    pub fn snapshot(&self) -> AgentRuntimeRecord {
        self.record.lock().clone()
    }
}

/// Console sink bound to one build.
#[derive(Clone)]
pub struct BuildConsole {
    publisher: Arc<dyn BuildPublisher>,
    build_id: String,
}

impl BuildConsole {
    pub fn new(publisher: Arc<dyn BuildPublisher>, build_id: impl Into<String>) -> Self {
        Self { publisher, build_id: build_id.into() }
    }
}

impl ConsoleSink for BuildConsole {
    fn console_line(&self, line: &str) {
        self.publisher.console(&self.build_id, line);
    }
}

/// Publishes over the agent's session channel.
pub struct ChannelPublisher {
    channel: Arc<dyn AgentChannel>,
    runtime: Handle,
    properties: Mutex<Vec<Property>>,
}

impl ChannelPublisher {
    pub fn new(channel: Arc<dyn AgentChannel>, runtime: Handle) -> Self {
        Self { channel, runtime, properties: Mutex::new(Vec::new()) }
    }

    /// Properties recorded by finished work, oldest first.
    pub fn properties(&self) -> Vec<Property> {
        self.properties.lock().clone()
    }

    pub fn property(&self, name: &str) -> Option<String> {
        self.properties.lock().iter().rev().find(|p| p.name == name).map(|p| p.value.clone())
    }

    fn send_and_wait(&self, message: Message) -> Result<(), ChannelError> {
        self.runtime.block_on(self.channel.send_and_wait_for_acknowledgement(message))
    }
}

impl BuildPublisher for ChannelPublisher {
    fn console(&self, build_id: &str, line: &str) {
        let out = ConsoleOut { build_id: build_id.to_string(), line: line.to_string() };
        let sent = Message::console_out(&out)
            .map_err(ChannelError::from)
            .and_then(|message| self.channel.send(message));
        if let Err(e) = sent {
            tracing::debug!(build_id, error = %e, "console line dropped");
        }
    }

    fn report_current_status(&self, report: Report) -> Result<(), ChannelError> {
        self.send_and_wait(Message::report_current_status(&report)?)
    }

    fn report_completed(&self, report: Report) -> Result<(), ChannelError> {
        self.send_and_wait(Message::report_completed(&report)?)
    }

    fn set_property(&self, property: Property) {
        tracing::info!(name = %property.name, value = %property.value, "property recorded");
        self.properties.lock().push(property);
    }
}

/// Assignments that do nothing when run.
struct IdleWork(&'static str);

impl Work for IdleWork {
    fn description(&self) -> String {
        self.0.to_string()
    }

    fn do_work(&self, _ctx: &WorkContext) -> Result<(), WorkError> {
        tracing::debug!(work = self.0, "nothing to do");
        Ok(())
    }
}

/// Fails so the controller discards its credential and registers again.
struct UnregisteredWork;

impl Work for UnregisteredWork {
    fn description(&self) -> String {
        "unregistered agent".to_string()
    }

    fn do_work(&self, ctx: &WorkContext) -> Result<(), WorkError> {
        Err(WorkError::Unregistered(ctx.record.lock().uuid().to_string()))
    }
}

/// Turn an `assignWork` payload into something the runner can execute.
pub fn work_from_assignment(assignment: WorkAssignment) -> Arc<dyn Work> {
    match assignment {
        WorkAssignment::Build { settings } => Arc::new(BuildWork::new(settings)),
        WorkAssignment::Sleep { name, millis } => Arc::new(SleepWork::new(name, millis)),
        WorkAssignment::NoWork => Arc::new(IdleWork("no work")),
        WorkAssignment::DeniedAgent => Arc::new(IdleWork("denied agent")),
        WorkAssignment::UnregisteredAgent => Arc::new(UnregisteredWork),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
