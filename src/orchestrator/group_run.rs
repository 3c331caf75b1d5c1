//! Ordered group start/stop as an explicit step machine.
//!
//! A run visits members in ascending `startup_order` (ties in insertion order).
//! Each `advance` performs exactly one step: attempt the next member, or hand
//! back a wait that the driver must honour before the next attempt. Waits are
//! only produced after a successful start of a member with a non-zero delay
//! that still has a successor. Failures are recorded per member and the run
//! moves on; nothing is retried or rolled back.

use crate::inventory::Inventory;
use crate::model::{Action, ContainerId, Group, GroupId};
use crate::runtime::RuntimeClient;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "partial success")]
    PartialSuccess,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::PartialSuccess => "partial success",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupOutcome {
    pub status: OutcomeStatus,
    pub group_id: GroupId,
    pub group: String,
    pub action: Action,
    /// Failure reason per container id.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<ContainerId, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Attempted { container_id: ContainerId, ok: bool },
    Wait(Duration),
    Done,
}

#[derive(Debug, Clone)]
struct PlannedMember {
    container_id: ContainerId,
    runtime_identifier: String,
    delay: Duration,
}

#[derive(Debug, Clone)]
pub struct GroupRun {
    group_id: GroupId,
    group_name: String,
    action: Action,
    members: Vec<PlannedMember>,
    next: usize,
    pending_wait: Option<Duration>,
    errors: BTreeMap<ContainerId, String>,
}

impl GroupRun {
    /// Snapshot the group's current membership into a run.
    pub fn plan(inventory: &Inventory, group: &Group, action: Action) -> Self {
        let members = inventory
            .group_members(group)
            .into_iter()
            .map(|(m, c)| PlannedMember {
                container_id: c.id,
                runtime_identifier: c.runtime_identifier.clone(),
                delay: m.delay(),
            })
            .collect();
        Self {
            group_id: group.id,
            group_name: group.name.clone(),
            action,
            members,
            next: 0,
            pending_wait: None,
            errors: BTreeMap::new(),
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn total(&self) -> usize {
        self.members.len()
    }

    pub fn attempted(&self) -> usize {
        self.next
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.members.len() && self.pending_wait.is_none()
    }

    pub async fn advance(&mut self, runtime: &dyn RuntimeClient) -> Step {
        if let Some(wait) = self.pending_wait.take() {
            return Step::Wait(wait);
        }
        let Some(member) = self.members.get(self.next).cloned() else {
            return Step::Done;
        };
        self.next += 1;

        match runtime.apply(&member.runtime_identifier, self.action).await {
            Ok(()) => {
                tracing::info!(
                    group_id = self.group_id,
                    container_id = member.container_id,
                    action = %self.action,
                    "Group member action applied"
                );
                let has_successor = self.next < self.members.len();
                if self.action == Action::Start && !member.delay.is_zero() && has_successor {
                    self.pending_wait = Some(member.delay);
                }
                Step::Attempted {
                    container_id: member.container_id,
                    ok: true,
                }
            }
            Err(e) => {
                tracing::warn!(
                    group_id = self.group_id,
                    container_id = member.container_id,
                    action = %self.action,
                    error = %e,
                    "Group member action failed, continuing"
                );
                self.errors.insert(member.container_id, e.to_string());
                Step::Attempted {
                    container_id: member.container_id,
                    ok: false,
                }
            }
        }
    }

    pub fn outcome(&self) -> GroupOutcome {
        GroupOutcome {
            status: if self.errors.is_empty() {
                OutcomeStatus::Success
            } else {
                OutcomeStatus::PartialSuccess
            },
            group_id: self.group_id,
            group: self.group_name.clone(),
            action: self.action,
            errors: self.errors.clone(),
        }
    }
}

/// Run to completion, sleeping on the tokio timer for every wait step.
pub async fn drive(run: &mut GroupRun, runtime: &dyn RuntimeClient) -> GroupOutcome {
    while !run.is_finished() {
        if let Step::Wait(d) = run.advance(runtime).await {
            tokio::time::sleep(d).await;
        }
    }
    run.outcome()
}
