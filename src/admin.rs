//! Admin-only inventory operations.
//!
//! `Admin::new` checks the acting user's role once; every operation after that
//! runs on behalf of that explicit actor.

use crate::credentials::{generate_api_key, hash_password, verify_password};
use crate::error::Result;
use crate::gate::require_admin;
use crate::inventory::{ContainerSpec, GroupSpec, InventoryHandle, UserSpec};
use crate::model::{ContainerId, GroupId, Role, User, UserId};
use std::collections::HashMap;

/// Raw reorder values for one group member, as submitted.
#[derive(Debug, Clone, Default)]
pub struct MemberOverride {
    pub startup_order: Option<String>,
    pub delay_seconds: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserForm {
    pub username: String,
    /// Required on create; on update `None` keeps the current password.
    pub password: Option<String>,
    pub role: Role,
    pub grants: Vec<ContainerId>,
}

impl UserForm {
    fn into_spec(self) -> Result<UserSpec> {
        let password_hash = match self.password.filter(|p| !p.is_empty()) {
            Some(p) => Some(hash_password(&p)?),
            None => None,
        };
        Ok(UserSpec {
            username: self.username,
            password_hash,
            role: self.role,
            grants: self.grants,
        })
    }
}

/// Parse an override; anything missing or malformed yields `None`.
fn parse_override<T: std::str::FromStr>(raw: Option<&String>) -> Option<T> {
    raw.and_then(|s| s.trim().parse().ok())
}

pub struct Admin<'a> {
    inventory: &'a InventoryHandle,
    actor: &'a User,
}

impl<'a> Admin<'a> {
    pub fn new(inventory: &'a InventoryHandle, actor: &'a User) -> Result<Self> {
        require_admin(actor)?;
        Ok(Self { inventory, actor })
    }

    pub async fn create_container(&self, spec: ContainerSpec) -> Result<ContainerId> {
        let id = self.inventory.mutate(|inv| inv.create_container(spec)).await?;
        tracing::info!(actor = self.actor.id, container_id = id, "Container added");
        Ok(id)
    }

    pub async fn update_container(&self, id: ContainerId, spec: ContainerSpec) -> Result<()> {
        self.inventory.mutate(|inv| inv.update_container(id, spec)).await?;
        tracing::info!(actor = self.actor.id, container_id = id, "Container updated");
        Ok(())
    }

    pub async fn delete_container(&self, id: ContainerId) -> Result<()> {
        let removed = self.inventory.mutate(|inv| inv.delete_container(id)).await?;
        tracing::info!(
            actor = self.actor.id,
            container_id = id,
            internal_name = %removed.internal_name,
            "Container deleted"
        );
        Ok(())
    }

    /// Apply new `order_index` values; a missing or invalid entry keeps the old one.
    pub async fn reorder_containers(&self, overrides: &HashMap<ContainerId, String>) -> Result<()> {
        self.inventory
            .mutate(|inv| {
                let ids: Vec<ContainerId> = inv.containers().iter().map(|c| c.id).collect();
                for id in ids {
                    if let Some(order) = parse_override::<i64>(overrides.get(&id)) {
                        inv.set_container_order(id, order)?;
                    }
                }
                Ok(())
            })
            .await?;
        tracing::info!(actor = self.actor.id, "Container order updated");
        Ok(())
    }

    pub async fn create_group(&self, spec: GroupSpec) -> Result<GroupId> {
        let id = self.inventory.mutate(|inv| inv.create_group(spec)).await?;
        tracing::info!(actor = self.actor.id, group_id = id, "Group created");
        Ok(id)
    }

    pub async fn update_group(&self, id: GroupId, spec: GroupSpec) -> Result<()> {
        self.inventory.mutate(|inv| inv.update_group(id, spec)).await?;
        tracing::info!(actor = self.actor.id, group_id = id, "Group updated");
        Ok(())
    }

    pub async fn delete_group(&self, id: GroupId) -> Result<()> {
        self.inventory.mutate(|inv| inv.delete_group(id)).await?;
        tracing::info!(actor = self.actor.id, group_id = id, "Group deleted");
        Ok(())
    }

    pub async fn reorder_groups(&self, overrides: &HashMap<GroupId, String>) -> Result<()> {
        self.inventory
            .mutate(|inv| {
                let ids: Vec<GroupId> = inv.groups().iter().map(|g| g.id).collect();
                for id in ids {
                    if let Some(order) = parse_override::<i64>(overrides.get(&id)) {
                        inv.set_group_order(id, order)?;
                    }
                }
                Ok(())
            })
            .await?;
        tracing::info!(actor = self.actor.id, "Group order updated");
        Ok(())
    }

    /// Adjust startup order and delay of members in place. Each value is
    /// applied independently; negative or unparsable delays keep the old one.
    pub async fn reorder_group_members(
        &self,
        group_id: GroupId,
        overrides: &HashMap<ContainerId, MemberOverride>,
    ) -> Result<()> {
        self.inventory
            .mutate(|inv| {
                let group = inv
                    .group(group_id)
                    .ok_or_else(|| crate::error::ControlError::NotFound("Group not found.".into()))?;
                let members: Vec<ContainerId> = group.members.iter().map(|m| m.container_id).collect();
                for container_id in members {
                    let Some(o) = overrides.get(&container_id) else {
                        continue;
                    };
                    let order = parse_override::<i64>(o.startup_order.as_ref());
                    let delay = parse_override::<u64>(o.delay_seconds.as_ref());
                    inv.set_member_order(group_id, container_id, order, delay)?;
                }
                Ok(())
            })
            .await?;
        tracing::info!(actor = self.actor.id, group_id, "Group member order updated");
        Ok(())
    }

    pub async fn create_user(&self, form: UserForm) -> Result<UserId> {
        let spec = form.into_spec()?;
        let id = self.inventory.mutate(|inv| inv.create_user(spec)).await?;
        tracing::info!(actor = self.actor.id, user_id = id, "User created");
        Ok(id)
    }

    /// Update a user; the grant set is replaced wholesale.
    pub async fn update_user(&self, id: UserId, form: UserForm) -> Result<()> {
        let spec = form.into_spec()?;
        self.inventory.mutate(|inv| inv.update_user(id, spec)).await?;
        tracing::info!(actor = self.actor.id, user_id = id, "User updated");
        Ok(())
    }

    pub async fn delete_user(&self, id: UserId) -> Result<()> {
        let actor = self.actor.id;
        self.inventory.mutate(|inv| inv.delete_user(actor, id)).await?;
        tracing::info!(actor, user_id = id, "User deleted");
        Ok(())
    }

    /// Issue a fresh API key for `id`, replacing any previous one.
    pub async fn issue_api_key(&self, id: UserId) -> Result<String> {
        let key = generate_api_key();
        let stored = key.clone();
        self.inventory
            .mutate(|inv| inv.set_api_key(id, Some(stored)))
            .await?;
        tracing::info!(actor = self.actor.id, user_id = id, "New API key generated");
        Ok(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Make sure an admin with these credentials exists. The first existing admin
/// is renamed and re-keyed if needed; otherwise a new admin is created.
pub async fn bootstrap_admin(
    inventory: &InventoryHandle,
    username: &str,
    password: &str,
) -> Result<BootstrapOutcome> {
    inventory
        .mutate(|inv| match inv.first_admin().cloned() {
            Some(admin) => {
                if admin.username == username && verify_password(password, &admin.password_hash) {
                    return Ok(BootstrapOutcome::Unchanged);
                }
                inv.update_user(
                    admin.id,
                    UserSpec {
                        username: username.to_string(),
                        password_hash: Some(hash_password(password)?),
                        role: Role::Admin,
                        grants: admin.grants.iter().copied().collect(),
                    },
                )?;
                Ok(BootstrapOutcome::Updated)
            }
            None => {
                inv.create_user(UserSpec {
                    username: username.to_string(),
                    password_hash: Some(hash_password(password)?),
                    role: Role::Admin,
                    grants: Vec::new(),
                })?;
                Ok(BootstrapOutcome::Created)
            }
        })
        .await
}
