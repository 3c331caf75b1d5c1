//! Inventory of containers, groups and users.
//!
//! Every mutation checks the model invariants before touching state: unique
//! names, edges that only point at existing containers, and at least one admin.
//! `InventoryHandle` applies mutations to a copy and swaps it in only after the
//! new document has been persisted, so a failed save never leaves a half
//! replaced grant or membership set behind.

use crate::error::{ControlError, Result};
use crate::model::{Container, ContainerId, Group, GroupId, GroupMembership, Role, User, UserId};
use crate::storage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IdCounters {
    container: u64,
    group: u64,
    user: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    last_ids: IdCounters,
    #[serde(default)]
    containers: Vec<Container>,
    #[serde(default)]
    groups: Vec<Group>,
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub internal_name: String,
    pub display_name: String,
    pub runtime_identifier: String,
    pub icon: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub name: String,
    pub icon: Option<String>,
    /// Member containers in startup order.
    pub members: Vec<ContainerId>,
}

#[derive(Debug, Clone)]
pub struct UserSpec {
    pub username: String,
    /// `None` keeps the current hash on update.
    pub password_hash: Option<String>,
    pub role: Role,
    pub grants: Vec<ContainerId>,
}

fn required(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ControlError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

impl Inventory {
    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn container(&self, id: ContainerId) -> Option<&Container> {
        self.containers.iter().find(|c| c.id == id)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn user_by_username(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn first_admin(&self) -> Option<&User> {
        self.users.iter().find(|u| u.is_admin())
    }

    pub fn admin_count(&self) -> usize {
        self.users.iter().filter(|u| u.is_admin()).count()
    }

    pub fn is_grouped(&self, container_id: ContainerId) -> bool {
        self.groups.iter().any(|g| g.contains(container_id))
    }

    /// Containers that belong to no group, in insertion order.
    pub fn ungrouped_containers(&self) -> Vec<&Container> {
        self.containers
            .iter()
            .filter(|c| !self.is_grouped(c.id))
            .collect()
    }

    /// Members of `group` paired with their container, in startup order.
    pub fn group_members<'a>(&'a self, group: &'a Group) -> Vec<(&'a GroupMembership, &'a Container)> {
        group
            .ordered_members()
            .into_iter()
            .filter_map(|m| self.container(m.container_id).map(|c| (m, c)))
            .collect()
    }

    fn container_mut(&mut self, id: ContainerId) -> Result<&mut Container> {
        self.containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ControlError::NotFound("Container not found".into()))
    }

    fn group_mut(&mut self, id: GroupId) -> Result<&mut Group> {
        self.groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| ControlError::NotFound("Group not found".into()))
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut User> {
        self.users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| ControlError::NotFound("User not found".into()))
    }

    /// Keep ids that name existing containers, first occurrence wins.
    fn known_containers(&self, ids: &[ContainerId]) -> Vec<ContainerId> {
        let mut seen = HashSet::new();
        ids.iter()
            .copied()
            .filter(|id| self.container(*id).is_some() && seen.insert(*id))
            .collect()
    }

    fn fresh_members(&self, ids: &[ContainerId]) -> Vec<GroupMembership> {
        self.known_containers(ids)
            .into_iter()
            .enumerate()
            .map(|(idx, container_id)| GroupMembership {
                container_id,
                startup_order: idx as i64,
                delay_seconds: 0,
            })
            .collect()
    }

    // -- containers --

    pub fn create_container(&mut self, spec: ContainerSpec) -> Result<ContainerId> {
        let internal_name = required(&spec.internal_name, "Internal name")?;
        let display_name = required(&spec.display_name, "Display name")?;
        let runtime_identifier = required(&spec.runtime_identifier, "Runtime identifier")?;
        if self.containers.iter().any(|c| c.internal_name == internal_name) {
            return Err(ControlError::Conflict(
                "Error: Container name already exists.".into(),
            ));
        }
        self.last_ids.container += 1;
        let id = self.last_ids.container;
        self.containers.push(Container {
            id,
            internal_name,
            display_name,
            runtime_identifier,
            icon: spec.icon,
            order_index: 0,
        });
        Ok(id)
    }

    /// Replace names and identifier; `icon: None` keeps the current icon.
    pub fn update_container(&mut self, id: ContainerId, spec: ContainerSpec) -> Result<()> {
        let internal_name = required(&spec.internal_name, "Internal name")?;
        let display_name = required(&spec.display_name, "Display name")?;
        let runtime_identifier = required(&spec.runtime_identifier, "Runtime identifier")?;
        if self
            .containers
            .iter()
            .any(|c| c.id != id && c.internal_name == internal_name)
        {
            return Err(ControlError::Conflict(
                "Error: Container name already exists.".into(),
            ));
        }
        let container = self.container_mut(id)?;
        container.internal_name = internal_name;
        container.display_name = display_name;
        container.runtime_identifier = runtime_identifier;
        if spec.icon.is_some() {
            container.icon = spec.icon;
        }
        Ok(())
    }

    /// Remove a container along with its memberships and grants.
    pub fn delete_container(&mut self, id: ContainerId) -> Result<Container> {
        let pos = self
            .containers
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ControlError::NotFound("Container not found".into()))?;
        let removed = self.containers.remove(pos);
        for group in &mut self.groups {
            group.members.retain(|m| m.container_id != id);
        }
        for user in &mut self.users {
            user.grants.remove(&id);
        }
        Ok(removed)
    }

    pub fn set_container_order(&mut self, id: ContainerId, order_index: i64) -> Result<()> {
        self.container_mut(id)?.order_index = order_index;
        Ok(())
    }

    // -- groups --

    pub fn create_group(&mut self, spec: GroupSpec) -> Result<GroupId> {
        let name = required(&spec.name, "Group name")?;
        if self.groups.iter().any(|g| g.name == name) {
            return Err(ControlError::Conflict("Error: Group name already exists.".into()));
        }
        let members = self.fresh_members(&spec.members);
        self.last_ids.group += 1;
        let id = self.last_ids.group;
        self.groups.push(Group {
            id,
            name,
            icon: spec.icon,
            order_index: 0,
            members,
        });
        Ok(id)
    }

    /// Rename the group and replace its membership wholesale.
    pub fn update_group(&mut self, id: GroupId, spec: GroupSpec) -> Result<()> {
        let name = required(&spec.name, "Group name")?;
        if self.groups.iter().any(|g| g.id != id && g.name == name) {
            return Err(ControlError::Conflict("Error: Group name already exists.".into()));
        }
        let members = self.fresh_members(&spec.members);
        let group = self.group_mut(id)?;
        group.name = name;
        if spec.icon.is_some() {
            group.icon = spec.icon;
        }
        group.members = members;
        Ok(())
    }

    pub fn delete_group(&mut self, id: GroupId) -> Result<Group> {
        let pos = self
            .groups
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| ControlError::NotFound("Group not found".into()))?;
        Ok(self.groups.remove(pos))
    }

    pub fn set_group_order(&mut self, id: GroupId, order_index: i64) -> Result<()> {
        self.group_mut(id)?.order_index = order_index;
        Ok(())
    }

    /// Adjust one membership in place. `None` leaves the value untouched.
    pub fn set_member_order(
        &mut self,
        group_id: GroupId,
        container_id: ContainerId,
        startup_order: Option<i64>,
        delay_seconds: Option<u64>,
    ) -> Result<()> {
        let group = self.group_mut(group_id)?;
        let member = group
            .members
            .iter_mut()
            .find(|m| m.container_id == container_id)
            .ok_or_else(|| ControlError::NotFound("Container is not a member of this group".into()))?;
        if let Some(order) = startup_order {
            member.startup_order = order;
        }
        if let Some(delay) = delay_seconds {
            member.delay_seconds = delay;
        }
        Ok(())
    }

    // -- users --

    pub fn create_user(&mut self, spec: UserSpec) -> Result<UserId> {
        let username = required(&spec.username, "Username")?;
        let password_hash = spec.password_hash.ok_or_else(|| {
            ControlError::Validation("Password is required for new users.".into())
        })?;
        if self.user_by_username(&username).is_some() {
            return Err(ControlError::Conflict("Error: Username already exists.".into()));
        }
        let grants: BTreeSet<ContainerId> = self.known_containers(&spec.grants).into_iter().collect();
        self.last_ids.user += 1;
        let id = self.last_ids.user;
        self.users.push(User {
            id,
            username,
            password_hash,
            role: spec.role,
            api_key: None,
            grants,
        });
        Ok(id)
    }

    /// Update a user, replacing the grant set wholesale.
    pub fn update_user(&mut self, id: UserId, spec: UserSpec) -> Result<()> {
        let username = required(&spec.username, "Username")?;
        if self.users.iter().any(|u| u.id != id && u.username == username) {
            return Err(ControlError::Conflict("Error: Username already exists.".into()));
        }
        let current = self
            .user(id)
            .ok_or_else(|| ControlError::NotFound("User not found".into()))?;
        if current.is_admin() && spec.role != Role::Admin && self.admin_count() <= 1 {
            return Err(ControlError::Conflict(
                "You cannot demote the only admin.".into(),
            ));
        }
        let grants: BTreeSet<ContainerId> = self.known_containers(&spec.grants).into_iter().collect();
        let user = self.user_mut(id)?;
        user.username = username;
        if let Some(hash) = spec.password_hash {
            user.password_hash = hash;
        }
        user.role = spec.role;
        user.grants = grants;
        Ok(())
    }

    /// Delete a user on behalf of `actor_id`. The last admin, and an admin
    /// deleting their own account, are refused.
    pub fn delete_user(&mut self, actor_id: UserId, id: UserId) -> Result<User> {
        let target = self
            .user(id)
            .ok_or_else(|| ControlError::NotFound("User not found.".into()))?;
        if target.is_admin() && (self.admin_count() <= 1 || target.id == actor_id) {
            return Err(ControlError::Conflict(
                "You cannot delete the only admin or yourself.".into(),
            ));
        }
        let pos = self
            .users
            .iter()
            .position(|u| u.id == id)
            .ok_or_else(|| ControlError::NotFound("User not found.".into()))?;
        Ok(self.users.remove(pos))
    }

    pub fn set_api_key(&mut self, id: UserId, api_key: Option<String>) -> Result<()> {
        self.user_mut(id)?.api_key = api_key;
        Ok(())
    }
}

struct Cached {
    inventory: Inventory,
    stamp: Option<storage::FileStamp>,
}

/// Shared, persisted inventory.
///
/// Other processes (the `admin` commands) write the same file, so every read
/// and mutation first compares the file's stamp with the one last loaded and
/// reloads the document when it moved.
#[derive(Clone)]
pub struct InventoryHandle {
    inner: Arc<RwLock<Cached>>,
    path: Option<Arc<PathBuf>>,
}

impl InventoryHandle {
    /// Load the inventory at `path`; later mutations are saved back there.
    pub async fn open(path: PathBuf) -> std::result::Result<Self, storage::StorageError> {
        let stamp = storage::stamp(&path).await?;
        let inventory = storage::load(&path).await?;
        tracing::info!(
            path = %path.display(),
            containers = inventory.containers.len(),
            groups = inventory.groups.len(),
            users = inventory.users.len(),
            "Inventory loaded"
        );
        Ok(Self {
            inner: Arc::new(RwLock::new(Cached { inventory, stamp })),
            path: Some(Arc::new(path)),
        })
    }

    /// Inventory that is never written to disk.
    pub fn in_memory(inventory: Inventory) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Cached {
                inventory,
                stamp: None,
            })),
            path: None,
        }
    }

    /// Current inventory, reloaded first if the file changed on disk.
    pub async fn read(&self) -> Result<RwLockReadGuard<'_, Inventory>> {
        if let Some(path) = self.path.as_deref() {
            let current = storage::stamp(path).await?;
            if self.inner.read().await.stamp != current {
                let mut cached = self.inner.write().await;
                Self::reload_if_changed(path, &mut cached).await?;
            }
        }
        Ok(RwLockReadGuard::map(self.inner.read().await, |c| &c.inventory))
    }

    /// Apply `f` to a copy of the latest inventory, persist it, then publish it.
    pub async fn mutate<T>(&self, f: impl FnOnce(&mut Inventory) -> Result<T>) -> Result<T> {
        let mut cached = self.inner.write().await;
        if let Some(path) = self.path.as_deref() {
            Self::reload_if_changed(path, &mut cached).await?;
        }
        let mut next = cached.inventory.clone();
        let out = f(&mut next)?;
        if let Some(path) = self.path.as_deref() {
            storage::save(path, &next).await?;
            cached.stamp = storage::stamp(path).await?;
        }
        cached.inventory = next;
        Ok(out)
    }

    async fn reload_if_changed(path: &std::path::Path, cached: &mut Cached) -> Result<()> {
        let current = storage::stamp(path).await?;
        if cached.stamp == current {
            return Ok(());
        }
        cached.inventory = storage::load(path).await?;
        cached.stamp = current;
        tracing::info!(
            path = %path.display(),
            users = cached.inventory.users.len(),
            "Inventory changed on disk, reloaded"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn container(inv: &mut Inventory, name: &str) -> ContainerId {
        inv.create_container(ContainerSpec {
            internal_name: name.into(),
            display_name: name.to_uppercase(),
            runtime_identifier: format!("{name}-rt"),
            icon: None,
        })
        .unwrap()
    }

    pub fn group(inv: &mut Inventory, name: &str, members: &[ContainerId]) -> GroupId {
        inv.create_group(GroupSpec {
            name: name.into(),
            icon: None,
            members: members.to_vec(),
        })
        .unwrap()
    }

    /// Every fixture user's password is "secret"; hashed once per test binary.
    pub fn secret_hash() -> String {
        static HASH: std::sync::OnceLock<String> = std::sync::OnceLock::new();
        HASH.get_or_init(|| crate::credentials::hash_password("secret").unwrap())
            .clone()
    }

    pub fn user(inv: &mut Inventory, name: &str, role: Role, grants: &[ContainerId]) -> UserId {
        inv.create_user(UserSpec {
            username: name.into(),
            password_hash: Some(secret_hash()),
            role,
            grants: grants.to_vec(),
        })
        .unwrap()
    }
}
