// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dv-scheduler: Expands pipeline configuration into run records.
//!
//! The instance factory is pure computation over a configuration snapshot
//! and a [`SchedulingContext`]. It holds no locks; callers must not mutate
//! the context while a call is in progress.

mod context;
mod error;
mod factory;
mod label;
mod rerun;

pub use context::SchedulingContext;
pub use error::{ScheduleError, CONFIG_MISSING, NO_JOB_FOUND};
pub use factory::{InstanceFactory, GO_JOB_RUN_COUNT, GO_JOB_RUN_INDEX};
pub use label::{render_label, update_counter};
