// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job runner: one unit of work plus its cooperative cancellation switch.

use crate::error::WorkError;
use crate::work::WorkContext;
use dv_core::AgentRuntimeRecord;
use dv_wire::AgentInstruction;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation switch polled by running work between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns true only for the call that raised it.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A unit of work executed on the job thread.
pub trait Work: Send + Sync {
    fn description(&self) -> String;

    /// Run to completion, polling `ctx.cancel` at safe points.
    fn do_work(&self, ctx: &WorkContext) -> Result<(), WorkError>;

    /// React to cancellation. Called at most once per run.
    fn cancel(&self, record: &mut AgentRuntimeRecord) {
        record.cancel();
    }
}

pub struct JobRunner {
    work: Arc<dyn Work>,
    cancelled: CancelFlag,
}

impl JobRunner {
    pub fn new(work: Arc<dyn Work>) -> Self {
        Self { work, cancelled: CancelFlag::new() }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancelled.clone()
    }

    pub fn description(&self) -> String {
        self.work.description()
    }

    /// Apply a coordinator instruction. A cancel instruction takes effect
    /// once; repeats are ignored.
    pub fn handle_instruction(&self, instruction: AgentInstruction, record: &mut AgentRuntimeRecord) {
        if instruction.is_cancelled() && self.cancelled.cancel() {
            tracing::info!(work = %self.work.description(), "cancelling work");
            self.work.cancel(record);
        }
    }

    pub fn is_job_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    pub fn run(&self, ctx: &WorkContext) -> Result<(), WorkError> {
        self.work.do_work(ctx)
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
