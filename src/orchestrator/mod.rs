//! Workload lifecycle orchestration.
//!
//! This module owns start/stop for single containers and for ordered groups.
//! A group run is an explicit sequence of steps (`GroupRun`) advanced one at a
//! time; inter-member delays are timer waits, so the caller can either await
//! the whole run or hand it to the `JobRegistry` and poll for its outcome.

mod group_run;
mod jobs;
mod lifecycle;

pub use group_run::{drive, GroupOutcome, GroupRun, OutcomeStatus};
pub use jobs::{JobRegistry, JobSnapshot};
pub use lifecycle::{control_container, ContainerOutcome};
