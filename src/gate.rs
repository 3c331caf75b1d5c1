//! Authorization gate.
//!
//! Two ways in: a session identity (username + password login, role gates
//! admin operations) and the programmatic username + API key pair. The API
//! path ignores role entirely; every control or status call through it is
//! checked against the caller's grants, admins included.

use crate::access;
use crate::credentials::{api_key_matches, verify_password};
use crate::error::{ControlError, Result};
use crate::inventory::Inventory;
use crate::model::{Container, Group, User};

/// Resolve a session identity from username and password.
pub fn login<'a>(inventory: &'a Inventory, username: &str, password: &str) -> Result<&'a User> {
    match inventory.user_by_username(username) {
        Some(user) if verify_password(password, &user.password_hash) => Ok(user),
        _ => {
            tracing::warn!(username, "Login rejected");
            Err(ControlError::Authentication("Invalid credentials.".into()))
        }
    }
}

/// Resolve the caller of a programmatic request. A user without a stored key
/// can never authenticate this way.
pub fn authenticate_api<'a>(
    inventory: &'a Inventory,
    username: &str,
    api_key: &str,
) -> Result<&'a User> {
    match inventory.user_by_username(username) {
        Some(user) if api_key_matches(user.api_key.as_deref(), api_key) => Ok(user),
        _ => {
            tracing::warn!(username, "API credentials rejected");
            Err(ControlError::invalid_credentials())
        }
    }
}

pub fn require_admin(user: &User) -> Result<()> {
    if user.is_admin() {
        Ok(())
    } else {
        tracing::warn!(user_id = user.id, "Admin operation refused");
        Err(ControlError::admin_only())
    }
}

/// API path: the container must be in the caller's grants.
pub fn check_container_grant(user: &User, container: &Container) -> Result<()> {
    if user.has_grant(container.id) {
        Ok(())
    } else {
        Err(ControlError::Authorization(
            "Access denied to this container".into(),
        ))
    }
}

/// API path: every current member of the group must be granted.
pub fn check_group_grant(user: &User, group: &Group) -> Result<()> {
    if access::group_fully_granted(group, &user.grants) {
        Ok(())
    } else {
        Err(ControlError::Authorization("Access denied to this group".into()))
    }
}

/// Session path: the container must be visible to the user.
pub fn check_session_container(user: &User, container: &Container) -> Result<()> {
    if access::can_control_container(user, container) {
        Ok(())
    } else {
        Err(ControlError::Authorization(
            "Access denied to this container".into(),
        ))
    }
}

/// Session path: the group must be fully visible to the user.
pub fn check_session_group(user: &User, group: &Group) -> Result<()> {
    if access::can_control_group(user, group) {
        Ok(())
    } else {
        Err(ControlError::Authorization("Access denied to this group".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::fixtures::*;
    use crate::model::Role;

    #[test]
    fn api_key_must_match_exactly() {
        let mut inv = Inventory::default();
        let u = user(&mut inv, "alice", Role::User, &[]);
        inv.set_api_key(u, Some("k3y".into())).unwrap();

        assert_eq!(authenticate_api(&inv, "alice", "k3y").unwrap().id, u);
        assert!(matches!(
            authenticate_api(&inv, "alice", "K3Y"),
            Err(ControlError::Authentication(_))
        ));
        assert!(authenticate_api(&inv, "alice", "k3").is_err());
        assert!(authenticate_api(&inv, "alice", "k3yy").is_err());
        assert!(authenticate_api(&inv, "mallory", "k3y").is_err());
    }

    #[test]
    fn null_api_key_never_matches() {
        let mut inv = Inventory::default();
        user(&mut inv, "alice", Role::User, &[]);
        assert!(authenticate_api(&inv, "alice", "").is_err());
    }

    #[test]
    fn login_checks_password() {
        let mut inv = Inventory::default();
        let u = user(&mut inv, "alice", Role::User, &[]);
        assert_eq!(login(&inv, "alice", "secret").unwrap().id, u);
        assert!(login(&inv, "alice", "wrong").is_err());
        assert!(login(&inv, "nobody", "secret").is_err());
    }

    #[test]
    fn api_grant_check_ignores_admin_role() {
        let mut inv = Inventory::default();
        let a = container(&mut inv, "a");
        let root = user(&mut inv, "root", Role::Admin, &[]);
        let root = inv.user(root).unwrap();
        let a = inv.container(a).unwrap();

        assert!(matches!(
            check_container_grant(root, a),
            Err(ControlError::Authorization(_))
        ));
        assert!(check_session_container(root, a).is_ok());
    }

    #[test]
    fn group_grant_is_all_or_nothing() {
        let mut inv = Inventory::default();
        let a = container(&mut inv, "a");
        let b = container(&mut inv, "b");
        let g = group(&mut inv, "g", &[a, b]);
        let partial = user(&mut inv, "partial", Role::User, &[a]);
        let full = user(&mut inv, "full", Role::User, &[a, b]);
        let group = inv.group(g).unwrap();

        assert!(check_group_grant(inv.user(partial).unwrap(), group).is_err());
        assert!(check_group_grant(inv.user(full).unwrap(), group).is_ok());
        assert!(check_session_group(inv.user(partial).unwrap(), group).is_err());
    }

    #[test]
    fn only_admins_pass_require_admin() {
        let mut inv = Inventory::default();
        let root = user(&mut inv, "root", Role::Admin, &[]);
        let bob = user(&mut inv, "bob", Role::User, &[]);
        assert!(require_admin(inv.user(root).unwrap()).is_ok());
        assert!(require_admin(inv.user(bob).unwrap()).is_err());
    }
}
