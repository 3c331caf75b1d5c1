use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

pub type ContainerId = u64;
pub type GroupId = u64;
pub type UserId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    /// Unique internal name.
    pub internal_name: String,
    pub display_name: String,
    /// Name the container runtime addresses this workload by.
    pub runtime_identifier: String,
    #[serde(default)]
    pub icon: Option<String>,
    /// Ordering among standalone containers.
    #[serde(default)]
    pub order_index: i64,
}

/// Edge between a group and one of its member containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub container_id: ContainerId,
    #[serde(default)]
    pub startup_order: i64,
    /// Wait applied after this member starts successfully, before the next member.
    #[serde(default)]
    pub delay_seconds: u64,
}

impl GroupMembership {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub order_index: i64,
    /// Memberships in insertion order.
    #[serde(default)]
    pub members: Vec<GroupMembership>,
}

impl Group {
    /// Members sorted by `startup_order`, ties kept in insertion order.
    pub fn ordered_members(&self) -> Vec<&GroupMembership> {
        let mut members: Vec<&GroupMembership> = self.members.iter().collect();
        members.sort_by_key(|m| m.startup_order);
        members
    }

    pub fn contains(&self, container_id: ContainerId) -> bool {
        self.members.iter().any(|m| m.container_id == container_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{other}' (expected admin or user)")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Containers this user has been granted access to.
    #[serde(default)]
    pub grants: BTreeSet<ContainerId>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn has_grant(&self, container_id: ContainerId) -> bool {
        self.grants.contains(&container_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Start,
    Stop,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Action::Start),
            "stop" => Ok(Action::Stop),
            _ => Err("Invalid action".to_string()),
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(container_id: ContainerId, startup_order: i64) -> GroupMembership {
        GroupMembership {
            container_id,
            startup_order,
            delay_seconds: 0,
        }
    }

    #[test]
    fn ordered_members_is_stable_on_ties() {
        let group = Group {
            id: 1,
            name: "media".into(),
            icon: None,
            order_index: 0,
            members: vec![member(10, 5), member(11, 1), member(12, 5), member(13, -2)],
        };
        let order: Vec<ContainerId> = group
            .ordered_members()
            .iter()
            .map(|m| m.container_id)
            .collect();
        assert_eq!(order, vec![13, 11, 10, 12]);
    }

    #[test]
    fn action_parsing_rejects_unknown_verbs() {
        assert_eq!("start".parse::<Action>(), Ok(Action::Start));
        assert_eq!("stop".parse::<Action>(), Ok(Action::Stop));
        assert!("restart".parse::<Action>().is_err());
        assert!("Start".parse::<Action>().is_err());
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(" user ".parse::<Role>(), Ok(Role::User));
    }
}
