//! Runtime status aggregation for containers and groups.
//!
//! Read-only. A lookup that fails only degrades its own entry; the rest of the
//! aggregation carries on.

use crate::inventory::Inventory;
use crate::model::{Container, ContainerId, Group};
use crate::runtime::{RuntimeClient, RuntimeError};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

pub const NOT_FOUND: &str = "not found";
pub const UNREACHABLE: &str = "unreachable";
const RUNNING: &str = "running";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadStatus {
    /// Whatever the runtime reported, verbatim.
    Reported(String),
    /// The runtime does not know the identifier.
    NotFound,
    /// The lookup itself failed.
    Unreachable(String),
}

impl WorkloadStatus {
    pub fn as_str(&self) -> &str {
        match self {
            WorkloadStatus::Reported(s) => s,
            WorkloadStatus::NotFound => NOT_FOUND,
            WorkloadStatus::Unreachable(_) => UNREACHABLE,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, WorkloadStatus::Reported(s) if s == RUNNING)
    }
}

impl std::fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for WorkloadStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

pub async fn container_status(runtime: &dyn RuntimeClient, container: &Container) -> WorkloadStatus {
    match runtime.status(&container.runtime_identifier).await {
        Ok(state) => WorkloadStatus::Reported(state),
        Err(RuntimeError::NotFound(_)) => WorkloadStatus::NotFound,
        Err(e) => {
            tracing::warn!(
                container_id = container.id,
                runtime_identifier = %container.runtime_identifier,
                error = %e,
                "Status lookup failed"
            );
            WorkloadStatus::Unreachable(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub running: usize,
    pub total: usize,
    /// Per-member status keyed by container id.
    pub members: BTreeMap<ContainerId, WorkloadStatus>,
}

impl GroupStatus {
    /// `running/total`, e.g. `2/3`.
    pub fn summary(&self) -> String {
        format!("{}/{}", self.running, self.total)
    }
}

/// Query every member of `group` in startup order.
pub async fn group_status(
    runtime: &dyn RuntimeClient,
    inventory: &Inventory,
    group: &Group,
) -> GroupStatus {
    let members = inventory.group_members(group);
    let mut out = GroupStatus {
        running: 0,
        total: members.len(),
        members: BTreeMap::new(),
    };
    for (_, container) in members {
        let status = container_status(runtime, container).await;
        if status.is_running() {
            out.running += 1;
        }
        out.members.insert(container.id, status);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::fixtures::*;
    use crate::runtime::testing::{CallKind, FakeRuntime};

    #[tokio::test]
    async fn unknown_identifier_reads_not_found() {
        let mut inv = Inventory::default();
        let id = container(&mut inv, "ghost");
        let rt = FakeRuntime::default();

        let status = container_status(&rt, inv.container(id).unwrap()).await;
        assert_eq!(status, WorkloadStatus::NotFound);
        assert_eq!(status.as_str(), "not found");
    }

    #[tokio::test]
    async fn group_counts_only_running_members() {
        let mut inv = Inventory::default();
        let a = container(&mut inv, "a");
        let b = container(&mut inv, "b");
        let c = container(&mut inv, "c");
        let g = group(&mut inv, "g", &[a, b, c]);
        let rt = FakeRuntime::with(&[("a-rt", "running"), ("b-rt", "exited")]);

        let status = group_status(&rt, &inv, inv.group(g).unwrap()).await;
        assert_eq!(status.summary(), "1/3");
        assert_eq!(status.members[&a].as_str(), "running");
        assert_eq!(status.members[&b].as_str(), "exited");
        assert_eq!(status.members[&c].as_str(), "not found");
    }

    #[tokio::test]
    async fn empty_group_is_zero_of_zero() {
        let mut inv = Inventory::default();
        let g = group(&mut inv, "g", &[]);
        let rt = FakeRuntime::default();
        let status = group_status(&rt, &inv, inv.group(g).unwrap()).await;
        assert_eq!(status.summary(), "0/0");
        assert!(status.members.is_empty());
    }

    #[tokio::test]
    async fn unreachable_member_does_not_abort_aggregation() {
        let mut inv = Inventory::default();
        let a = container(&mut inv, "a");
        let b = container(&mut inv, "b");
        let c = container(&mut inv, "c");
        let g = group(&mut inv, "g", &[a, b, c]);
        inv.set_member_order(g, a, Some(9), None).unwrap();
        let rt = FakeRuntime::with(&[("a-rt", "running"), ("b-rt", "running"), ("c-rt", "running")]);
        rt.break_link("b-rt");

        let status = group_status(&rt, &inv, inv.group(g).unwrap()).await;
        assert_eq!(status.summary(), "2/3");
        assert_eq!(status.members[&b].as_str(), "unreachable");

        let queried: Vec<String> = rt
            .calls_of(CallKind::Status)
            .into_iter()
            .map(|c| c.identifier)
            .collect();
        assert_eq!(queried, vec!["b-rt", "c-rt", "a-rt"]);
    }

    #[test]
    fn statuses_serialize_as_plain_strings() {
        let mut members = BTreeMap::new();
        members.insert(3u64, WorkloadStatus::NotFound);
        members.insert(4u64, WorkloadStatus::Reported("paused".into()));
        let json = serde_json::to_value(&members).unwrap();
        assert_eq!(json, serde_json::json!({"3": "not found", "4": "paused"}));
    }
}
