//! Per-user visibility over the inventory.
//!
//! Admins see everything. Everyone else sees the groups whose entire
//! membership they hold grants for, plus every other granted container as a
//! standalone entry. A container granted inside a group the user cannot fully
//! see is still surfaced on its own; only group-level control is withheld.
//! Nothing here is cached: grants and membership change between requests.

use crate::inventory::Inventory;
use crate::model::{Container, ContainerId, Group, User};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug)]
pub struct Visibility<'a> {
    pub groups: Vec<&'a Group>,
    pub standalone: Vec<&'a Container>,
}

/// True when every current member of `group` is in `grants`. Empty groups qualify.
pub fn group_fully_granted(group: &Group, grants: &BTreeSet<ContainerId>) -> bool {
    group.members.iter().all(|m| grants.contains(&m.container_id))
}

pub fn resolve<'a>(user: &User, inventory: &'a Inventory) -> Visibility<'a> {
    let mut groups: Vec<&Group> = if user.is_admin() {
        inventory.groups().iter().collect()
    } else {
        inventory
            .groups()
            .iter()
            .filter(|g| group_fully_granted(g, &user.grants))
            .collect()
    };
    groups.sort_by_key(|g| g.order_index);

    let mut standalone: Vec<&Container> = if user.is_admin() {
        inventory.ungrouped_containers()
    } else {
        let covered: HashSet<ContainerId> = groups
            .iter()
            .flat_map(|g| g.members.iter().map(|m| m.container_id))
            .collect();
        inventory
            .containers()
            .iter()
            .filter(|c| user.has_grant(c.id) && !covered.contains(&c.id))
            .collect()
    };
    standalone.sort_by_key(|c| c.order_index);

    Visibility { groups, standalone }
}

/// Whether a session user may act on this container.
pub fn can_control_container(user: &User, container: &Container) -> bool {
    user.is_admin() || user.has_grant(container.id)
}

/// Whether a session user may act on this group as a whole.
pub fn can_control_group(user: &User, group: &Group) -> bool {
    user.is_admin() || group_fully_granted(group, &user.grants)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::fixtures::*;
    use crate::model::{GroupId, Role, UserId};

    struct World {
        inv: Inventory,
        media: GroupId,
        web: GroupId,
        empty: GroupId,
        plex: ContainerId,
        sonarr: ContainerId,
        nginx: ContainerId,
        php: ContainerId,
        lone: ContainerId,
        spare: ContainerId,
        admin: UserId,
        alice: UserId,
    }

    fn world() -> World {
        let mut inv = Inventory::default();
        let plex = container(&mut inv, "plex");
        let sonarr = container(&mut inv, "sonarr");
        let nginx = container(&mut inv, "nginx");
        let php = container(&mut inv, "php");
        let lone = container(&mut inv, "lone");
        let spare = container(&mut inv, "spare");
        let media = group(&mut inv, "media", &[plex, sonarr]);
        let web = group(&mut inv, "web", &[nginx, php]);
        let empty = group(&mut inv, "empty", &[]);
        let admin = user(&mut inv, "root", Role::Admin, &[]);
        let alice = user(&mut inv, "alice", Role::User, &[plex, sonarr, nginx, lone]);
        World {
            inv,
            media,
            web,
            empty,
            plex,
            sonarr,
            nginx,
            php,
            lone,
            spare,
            admin,
            alice,
        }
    }

    fn ids<T>(items: &[&T], id: impl Fn(&T) -> u64) -> Vec<u64> {
        items.iter().map(|t| id(t)).collect()
    }

    #[test]
    fn admin_sees_everything_regardless_of_grants() {
        let w = world();
        let admin = w.inv.user(w.admin).unwrap();
        assert!(admin.grants.is_empty());

        let v = resolve(admin, &w.inv);
        assert_eq!(ids(&v.groups, |g| g.id), vec![w.media, w.web, w.empty]);
        assert_eq!(ids(&v.standalone, |c| c.id), vec![w.lone, w.spare]);
    }

    #[test]
    fn user_sees_fully_granted_groups_and_leftover_grants() {
        let w = world();
        let alice = w.inv.user(w.alice).unwrap();

        let v = resolve(alice, &w.inv);
        // web is only half granted, empty is vacuously visible
        assert_eq!(ids(&v.groups, |g| g.id), vec![w.media, w.empty]);
        // nginx sits in a group alice cannot fully see, so it is surfaced alone
        assert_eq!(ids(&v.standalone, |c| c.id), vec![w.nginx, w.lone]);
    }

    #[test]
    fn user_never_sees_ungranted_containers() {
        let w = world();
        let alice = w.inv.user(w.alice).unwrap();
        let v = resolve(alice, &w.inv);

        let mut exposed: Vec<ContainerId> = v.standalone.iter().map(|c| c.id).collect();
        for g in &v.groups {
            exposed.extend(g.members.iter().map(|m| m.container_id));
        }
        assert!(exposed.iter().all(|id| alice.has_grant(*id)));
        assert!(!exposed.contains(&w.php));
        assert!(!exposed.contains(&w.spare));
    }

    #[test]
    fn revoking_one_grant_hides_group_and_promotes_members() {
        let mut w = world();
        let mut alice = w.inv.user(w.alice).unwrap().clone();
        alice.grants.remove(&w.sonarr);

        let v = resolve(&alice, &w.inv);
        assert_eq!(ids(&v.groups, |g| g.id), vec![w.empty]);
        assert_eq!(ids(&v.standalone, |c| c.id), vec![w.plex, w.nginx, w.lone]);

        // and granting php brings web back, taking nginx out of the standalone list
        alice.grants.insert(w.php);
        w.inv.set_group_order(w.web, -1).unwrap();
        let v = resolve(&alice, &w.inv);
        assert_eq!(ids(&v.groups, |g| g.id), vec![w.web, w.empty]);
        assert_eq!(ids(&v.standalone, |c| c.id), vec![w.plex, w.lone]);
    }

    #[test]
    fn standalone_follows_order_index() {
        let mut w = world();
        w.inv.set_container_order(w.lone, -5).unwrap();
        w.inv.set_container_order(w.nginx, 3).unwrap();
        let alice = w.inv.user(w.alice).unwrap();
        let v = resolve(alice, &w.inv);
        assert_eq!(ids(&v.standalone, |c| c.id), vec![w.lone, w.nginx]);
    }

    #[test]
    fn session_control_checks() {
        let w = world();
        let alice = w.inv.user(w.alice).unwrap();
        let admin = w.inv.user(w.admin).unwrap();
        let web = w.inv.group(w.web).unwrap();
        let php = w.inv.container(w.php).unwrap();

        assert!(!can_control_group(alice, web));
        assert!(!can_control_container(alice, php));
        assert!(can_control_group(admin, web));
        assert!(can_control_container(admin, php));
        assert!(can_control_group(alice, w.inv.group(w.media).unwrap()));
    }
}
