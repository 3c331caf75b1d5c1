//! Session-side view and control.
//!
//! Builds the per-user dashboard (visible groups with live member status, then
//! standalone containers) and performs session-initiated actions, reporting
//! their result as a flash-style notice.

use crate::access;
use crate::error::{ControlError, Result};
use crate::gate;
use crate::inventory::InventoryHandle;
use crate::model::{Action, ContainerId, GroupId, User};
use crate::orchestrator::{self, ContainerOutcome, GroupRun, OutcomeStatus};
use crate::runtime::RuntimeClient;
use crate::status::{self, WorkloadStatus};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct MemberCard {
    pub container_id: ContainerId,
    pub display_name: String,
    pub startup_order: i64,
    pub delay_seconds: u64,
    pub status: WorkloadStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupCard {
    pub id: GroupId,
    pub name: String,
    pub icon: Option<String>,
    /// `running/total`.
    pub status: String,
    pub members: Vec<MemberCard>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContainerCard {
    pub id: ContainerId,
    pub display_name: String,
    pub icon: Option<String>,
    pub status: WorkloadStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardView {
    pub groups: Vec<GroupCard>,
    pub containers: Vec<ContainerCard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: Level,
    pub message: String,
}

/// Result of a session group action: the summary notice plus the reason each
/// failed member gave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub notice: Notice,
    pub failures: BTreeMap<ContainerId, String>,
}

impl Notice {
    fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

pub async fn build_view(
    user: &User,
    inventory: &InventoryHandle,
    runtime: &dyn RuntimeClient,
) -> Result<DashboardView> {
    // Snapshot so no lock is held while the runtime is queried.
    let inv = inventory.read().await?.clone();
    let visible = access::resolve(user, &inv);
    let mut view = DashboardView::default();

    for group in visible.groups {
        let summary = status::group_status(runtime, &inv, group).await;
        let members = inv
            .group_members(group)
            .into_iter()
            .map(|(m, c)| MemberCard {
                container_id: c.id,
                display_name: c.display_name.clone(),
                startup_order: m.startup_order,
                delay_seconds: m.delay_seconds,
                status: summary
                    .members
                    .get(&c.id)
                    .cloned()
                    .unwrap_or(WorkloadStatus::NotFound),
            })
            .collect();
        view.groups.push(GroupCard {
            id: group.id,
            name: group.name.clone(),
            icon: group.icon.clone(),
            status: summary.summary(),
            members,
        });
    }

    for container in visible.standalone {
        view.containers.push(ContainerCard {
            id: container.id,
            display_name: container.display_name.clone(),
            icon: container.icon.clone(),
            status: status::container_status(runtime, container).await,
        });
    }
    Ok(view)
}

/// Start or stop one container from a session.
pub async fn control_container(
    user: &User,
    inventory: &InventoryHandle,
    runtime: &dyn RuntimeClient,
    container_id: ContainerId,
    action: Action,
) -> Result<Notice> {
    let container = {
        let inv = inventory.read().await?;
        let container = inv
            .container(container_id)
            .ok_or_else(|| ControlError::NotFound("Container not found".into()))?;
        gate::check_session_container(user, container)?;
        container.clone()
    };

    let notice = match orchestrator::control_container(runtime, &container, action).await? {
        ContainerOutcome::Applied => Notice::new(
            Level::Success,
            format!("{} {}.", container.display_name, past_tense(action)),
        ),
        ContainerOutcome::Missing(msg) => Notice::new(Level::Danger, msg),
    };
    Ok(notice)
}

/// Run a group action to completion from a session.
pub async fn control_group(
    user: &User,
    inventory: &InventoryHandle,
    runtime: &dyn RuntimeClient,
    group_id: GroupId,
    action: Action,
) -> Result<GroupReport> {
    let mut run = {
        let inv = inventory.read().await?;
        let group = inv
            .group(group_id)
            .ok_or_else(|| ControlError::NotFound("Group not found".into()))?;
        gate::check_session_group(user, group)?;
        GroupRun::plan(&inv, group, action)
    };

    let outcome = orchestrator::drive(&mut run, runtime).await;
    let notice = match outcome.status {
        OutcomeStatus::Success => Notice::new(
            Level::Info,
            format!("Group {} {}.", outcome.group, past_tense(action)),
        ),
        OutcomeStatus::PartialSuccess => Notice::new(
            Level::Danger,
            format!(
                "Group {} {} with {} failure(s).",
                outcome.group,
                past_tense(action),
                outcome.errors.len()
            ),
        ),
    };
    Ok(GroupReport {
        notice,
        failures: outcome.errors,
    })
}

fn past_tense(action: Action) -> &'static str {
    match action {
        Action::Start => "started",
        Action::Stop => "stopped",
    }
}
