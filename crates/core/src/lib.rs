// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dv-core: Data model shared by the drover coordinator and agents

pub mod macros;

pub mod agent;
pub mod clock;
pub mod config;
pub mod env_vars;
pub mod id;
pub mod job;
pub mod plan;
pub mod stage;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use agent::{
    human_readable_size, AgentBuildingInfo, AgentIdentifier, AgentRuntimeRecord,
    AgentRuntimeStatus,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    AgentConfig, ApprovalType, ArtifactConfig, ArtifactKind, ClusterProfile, DroverConfig,
    ElasticProfile, JobConfig, JobRunType, PipelineConfig, Resources, StageConfig, TaskConfig,
};
pub use env_vars::{EnvironmentVariable, EnvironmentVariables};
pub use id::{short, AckId};
pub use job::{
    run_instance_name, run_on_all_name, InstanceName, JobInstance, JobResult, JobState,
    JobStateTransition, UNPERSISTED_ID,
};
pub use plan::{ArtifactPlan, JobPlan};
pub use stage::{BuildCause, PipelineInstance, StageInstance, StageResult, DEFAULT_APPROVER};
