// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::WorkContext;
use crate::error::WorkError;
use crate::runner::Work;
use dv_wire::Property;
use std::time::{Duration, Instant};

const SLICE: Duration = Duration::from_millis(10);

/// Diagnostic work: sleeps, then records `<name>_result` as `done` or
/// `done_canceled`.
pub struct SleepWork {
    name: String,
    duration: Duration,
}

impl SleepWork {
    pub fn new(name: impl Into<String>, millis: u64) -> Self {
        Self { name: name.into(), duration: Duration::from_millis(millis) }
    }
}

impl Work for SleepWork {
    fn description(&self) -> String {
        format!("sleep {} for {:?}", self.name, self.duration)
    }

    fn do_work(&self, ctx: &WorkContext) -> Result<(), WorkError> {
        let deadline = Instant::now() + self.duration;
        while !ctx.cancel.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(SLICE.min(deadline - now));
        }

        let outcome = if ctx.cancel.is_cancelled() { "done_canceled" } else { "done" };
        ctx.publisher.set_property(Property::new(format!("{}_result", self.name), outcome));
        Ok(())
    }
}
