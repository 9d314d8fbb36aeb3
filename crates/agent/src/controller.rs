// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent controller: the lifecycle loop and the coordinator message dispatcher.
//!
//! Each tick runs `upgrade check -> register -> connect -> ping`. Inbound
//! messages arrive through [`AgentController::process`], which owns the
//! single job slot: assigning new work cancels and joins the running job
//! before the next one starts.

use crate::artifacts::ArtifactUploader;
use crate::channel::AgentChannel;
use crate::error::{is_caused_by_security, AgentError, WorkError};
use crate::identity::AgentIdentity;
use crate::plugins::PluginInfrastructure;
use crate::runner::{JobRunner, Work};
use crate::subprocess::{ExitHook, SubprocessLogger};
use crate::upgrade::{UpgradeCheck, UpgradeService};
use crate::work::{work_from_assignment, BuildWork, ChannelPublisher, WorkContext};
use dv_core::{AckId, AgentIdentifier, AgentRuntimeRecord};
use dv_wire::{Action, AgentInstruction, BuildSettings, Message, Property, Report, WorkAssignment};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Callback = Box<dyn FnOnce() + Send>;

/// Collaborators handed to [`AgentController::new`].
pub struct ControllerParts {
    pub identifier: AgentIdentifier,
    pub identity: Arc<dyn AgentIdentity>,
    pub channel: Arc<dyn AgentChannel>,
    pub upgrade: Arc<dyn UpgradeService>,
    pub plugins: Arc<dyn PluginInfrastructure>,
    pub uploader: Arc<dyn ArtifactUploader>,
    pub working_dir: PathBuf,
}

/// What one tick of the control loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Pinged,
    /// A newer agent is available; the process should exit and be restarted.
    UpgradeRequired { version: String },
}

struct RunningJob {
    runner: Arc<JobRunner>,
    handle: JoinHandle<()>,
}

pub struct AgentController {
    identifier: AgentIdentifier,
    identity: Arc<dyn AgentIdentity>,
    channel: Arc<dyn AgentChannel>,
    upgrade: Arc<dyn UpgradeService>,
    plugins: Arc<dyn PluginInfrastructure>,
    uploader: Arc<dyn ArtifactUploader>,
    publisher: Arc<ChannelPublisher>,
    subprocesses: Arc<SubprocessLogger>,
    record: Arc<Mutex<AgentRuntimeRecord>>,
    working_dir: PathBuf,
    current: Mutex<Option<RunningJob>>,
    callbacks: Mutex<HashMap<AckId, Callback>>,
    exit_hook: Mutex<Option<ExitHook>>,
}

impl AgentController {
    pub fn new(parts: ControllerParts, runtime: Handle) -> Self {
        let record = AgentRuntimeRecord::new(
            parts.identifier.clone(),
            parts.working_dir.display().to_string(),
        );
        Self {
            publisher: Arc::new(ChannelPublisher::new(Arc::clone(&parts.channel), runtime)),
            identifier: parts.identifier,
            identity: parts.identity,
            channel: parts.channel,
            upgrade: parts.upgrade,
            plugins: parts.plugins,
            uploader: parts.uploader,
            subprocesses: Arc::new(SubprocessLogger::new()),
            record: Arc::new(Mutex::new(record)),
            working_dir: parts.working_dir,
            current: Mutex::new(None),
            callbacks: Mutex::new(HashMap::new()),
            exit_hook: Mutex::new(None),
        }
    }

    /// One-time startup: plugins, the subprocess exit hook and the identity
    /// store. Plugin failures are logged and never abort startup.
    pub fn init(&self) -> Result<(), AgentError> {
        self.plugins.unpack_bundle();
        if let Err(e) = self.plugins.start_infrastructure() {
            error!(error = %e, "plugin infrastructure failed to start");
        } else if let Err(e) = self.plugins.register_plugins_folder_change_listener() {
            error!(error = %e, "plugin folder listener not registered");
        }
        *self.exit_hook.lock() = Some(self.subprocesses.register_as_exit_hook());
        self.identity.create_ssl_infrastructure()?;
        info!(agent = %self.identifier, "agent initialised");
        Ok(())
    }

    /// One pass of the control loop.
    pub async fn tick(&self) -> Result<TickOutcome, AgentError> {
        match self.upgrade.check_for_upgrade().await.map_err(AgentError::Upgrade)? {
            UpgradeCheck::UpToDate => {}
            UpgradeCheck::Required { version } => {
                info!(%version, "agent upgrade required");
                return Ok(TickOutcome::UpgradeRequired { version });
            }
        }

        self.identity.register_if_necessary(&self.identifier)?;

        if self.identity.is_registered() && self.channel.is_not_running() {
            if let Err(e) = self.channel.start().await {
                if is_caused_by_security(&e) {
                    error!(error = %e, "coordinator rejected agent credentials, re-registering");
                    self.identity.invalidate_agent_certificate();
                } else {
                    warn!(error = %e, "could not connect to coordinator");
                }
                return Err(e.into());
            }
            info!(session = %self.channel.name(), "connected to coordinator");
        }

        self.ping().await?;
        Ok(TickOutcome::Pinged)
    }

    /// Heartbeat carrying the current runtime record. Skipped until registered.
    pub async fn ping(&self) -> Result<(), AgentError> {
        if !self.identity.is_registered() {
            return Ok(());
        }
        let report = {
            let mut record = self.record.lock();
            record.ready();
            record.usable_space = fs2::available_space(&self.working_dir).ok();
            Report::heartbeat(record.clone())
        };
        self.channel.send_and_wait_for_acknowledgement(Message::ping(&report)?).await?;
        debug!(session = %self.channel.name(), "ping acknowledged");
        Ok(())
    }

    /// Send `message` and run `callback` when the coordinator acks its id.
    pub fn send_with_callback(
        &self,
        mut message: Message,
        callback: impl FnOnce() + Send + 'static,
    ) -> Result<AckId, AgentError> {
        let id = message.ensure_ack_id()?;
        self.callbacks.lock().insert(id.clone(), Box::new(callback));
        if let Err(e) = self.channel.send(message) {
            self.callbacks.lock().remove(&id);
            return Err(e.into());
        }
        Ok(id)
    }

    /// Handle one message from the coordinator.
    pub async fn process(self: &Arc<Self>, message: Message) -> Result<(), AgentError> {
        debug!(action = %message.action, "processing");
        if let Some(id) = &message.ack_id {
            self.channel.send(Message::acknowledge(id)?)?;
        }

        match message.action {
            Action::SetCookie => {
                let cookie: String = message.data_as()?;
                self.record.lock().set_cookie(cookie);
                debug!("cookie set");
            }
            Action::AssignWork => {
                let assignment: WorkAssignment = message.data_as()?;
                self.start_work(work_from_assignment(assignment)).await;
            }
            Action::Build => {
                let settings: BuildSettings = message.data_as()?;
                self.start_work(Arc::new(BuildWork::new(settings))).await;
            }
            Action::CancelBuild => self.cancel_current(),
            Action::Reregister => {
                warn!(agent = %self.identifier, "coordinator asked agent to re-register");
                self.identity.invalidate_agent_certificate();
                self.channel.stop();
            }
            Action::Ack | Action::Acknowledge => {
                let callback = message.acknowledged_id().and_then(|id| self.callbacks.lock().remove(&id));
                if let Some(callback) = callback {
                    callback();
                }
            }
            Action::Ping
            | Action::ConsoleOut
            | Action::ReportCurrentStatus
            | Action::ReportCompleted => {
                debug!(action = %message.action, "ignoring coordinator-bound message");
            }
        }
        Ok(())
    }

    /// Feed messages from the session channel into [`process`](Self::process).
    pub fn spawn_dispatcher(self: &Arc<Self>, mut inbound: mpsc::UnboundedReceiver<Message>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let action = message.action;
                if let Err(e) = controller.process(message).await {
                    warn!(%action, error = %e, "failed to process message");
                }
            }
            debug!("dispatcher stopped");
        })
    }

    async fn start_work(self: &Arc<Self>, work: Arc<dyn Work>) {
        let previous = self.current.lock().take();
        if let Some(previous) = previous {
            info!(work = %previous.runner.description(), "cancelling previous work");
            previous.runner.handle_instruction(AgentInstruction::CANCEL, &mut self.record.lock());
            if previous.handle.await.is_err() {
                warn!("previous work ended abnormally");
            }
        }

        let runner = Arc::new(JobRunner::new(work));
        let ctx = WorkContext {
            record: Arc::clone(&self.record),
            publisher: self.publisher.clone(),
            uploader: Arc::clone(&self.uploader),
            subprocesses: Arc::clone(&self.subprocesses),
            cancel: runner.cancel_flag(),
            working_dir: self.working_dir.clone(),
        };
        info!(work = %runner.description(), "starting work");

        let controller = Arc::clone(self);
        let job = Arc::clone(&runner);
        let handle = tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(move || job.run(&ctx)).await;
            controller.finish_work(outcome.unwrap_or(Err(WorkError::Join))).await;
        });
        *self.current.lock() = Some(RunningJob { runner, handle });
    }

    async fn finish_work(&self, outcome: Result<(), WorkError>) {
        match outcome {
            Ok(()) => {}
            Err(WorkError::Unregistered(uuid)) => {
                warn!(agent_uuid = %uuid, "coordinator does not know this agent");
                self.identity.invalidate_agent_certificate();
                self.channel.stop();
            }
            Err(e) => error!(error = %e, "work failed"),
        }
        self.record.lock().idle();
        if let Err(e) = self.ping().await {
            warn!(error = %e, "ping after work failed");
        }
    }

    fn cancel_current(&self) {
        let current = self.current.lock();
        match current.as_ref() {
            Some(job) => job.runner.handle_instruction(AgentInstruction::CANCEL, &mut self.record.lock()),
            None => debug!("cancel requested with no running work"),
        }
    }

    /// Wait until the running job, if any, has finished and reported.
    pub async fn wait_for_current_work(&self) {
        let current = self.current.lock().take();
        if let Some(job) = current {
            let _ = job.handle.await;
        }
    }

    pub fn runtime_record(&self) -> AgentRuntimeRecord {
        self.record.lock().clone()
    }

    pub fn properties(&self) -> Vec<Property> {
        self.publisher.properties()
    }

    pub fn property(&self, name: &str) -> Option<String> {
        self.publisher.property(name)
    }

    pub fn subprocesses(&self) -> &Arc<SubprocessLogger> {
        &self.subprocesses
    }

    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.lock().len()
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
