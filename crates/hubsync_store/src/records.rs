//! Managers, points, users and the user↔point join table.
//!
//! These records are owned by the record-management layer. The event store
//! only reads them, except for heartbeat timestamps which it maintains.

use crate::error::{StoreError, StoreResult};
use crate::types::{AccessManager, AccessPoint, AccessPointId, AccessUser, AccessUserId, ManagerId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One row of the user↔point join table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointUserLink {
    /// The access point.
    pub access_point_id: AccessPointId,
    /// The user allowed at that point.
    pub access_user_id: AccessUserId,
}

/// Serializable form of all records, used to seed a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seed {
    /// Managers and hubs.
    #[serde(default)]
    pub managers: Vec<AccessManager>,
    /// Access points.
    #[serde(default)]
    pub points: Vec<AccessPoint>,
    /// Credential holders.
    #[serde(default)]
    pub users: Vec<AccessUser>,
    /// User↔point associations.
    #[serde(default)]
    pub links: Vec<PointUserLink>,
}

/// In-memory record tables.
#[derive(Debug, Clone, Default)]
pub struct Records {
    managers: BTreeMap<ManagerId, AccessManager>,
    points: BTreeMap<AccessPointId, AccessPoint>,
    users: BTreeMap<AccessUserId, AccessUser>,
    /// Keyed point-first so "users of a point" is a range scan.
    links: BTreeSet<(AccessPointId, AccessUserId)>,
}

impl Records {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds tables from a seed, checking every reference.
    ///
    /// Duplicate IDs in the seed are rejected rather than silently
    /// overwritten.
    pub fn from_seed(seed: Seed) -> StoreResult<Self> {
        let mut records = Self::new();

        for manager in seed.managers {
            if records.managers.contains_key(&manager.id) {
                return Err(StoreError::InvalidSeed(format!("duplicate {}", manager.id)));
            }
            records.insert_manager(manager);
        }
        for user in seed.users {
            if records.users.contains_key(&user.id) {
                return Err(StoreError::InvalidSeed(format!("duplicate {}", user.id)));
            }
            records.insert_user(user);
        }
        for point in seed.points {
            if records.points.contains_key(&point.id) {
                return Err(StoreError::InvalidSeed(format!("duplicate {}", point.id)));
            }
            records.insert_point(point)?;
        }
        for link in seed.links {
            records.link(link.access_user_id, link.access_point_id)?;
        }

        Ok(records)
    }

    /// Exports the tables as a seed.
    #[must_use]
    pub fn to_seed(&self) -> Seed {
        Seed {
            managers: self.managers.values().cloned().collect(),
            points: self.points.values().cloned().collect(),
            users: self.users.values().cloned().collect(),
            links: self
                .links
                .iter()
                .map(|&(access_point_id, access_user_id)| PointUserLink {
                    access_point_id,
                    access_user_id,
                })
                .collect(),
        }
    }

    /// Inserts or replaces a manager.
    pub fn insert_manager(&mut self, manager: AccessManager) {
        self.managers.insert(manager.id, manager);
    }

    /// Inserts or replaces a point. Its manager must exist.
    pub fn insert_point(&mut self, point: AccessPoint) -> StoreResult<()> {
        if !self.managers.contains_key(&point.manager_id) {
            return Err(StoreError::UnknownManager(point.manager_id));
        }
        self.points.insert(point.id, point);
        Ok(())
    }

    /// Inserts or replaces a user.
    pub fn insert_user(&mut self, user: AccessUser) {
        self.users.insert(user.id, user);
    }

    /// Adds a user↔point association.
    ///
    /// Returns `false` if the association already existed.
    pub fn link(&mut self, user: AccessUserId, point: AccessPointId) -> StoreResult<bool> {
        if !self.users.contains_key(&user) {
            return Err(StoreError::UnknownUser(user));
        }
        if !self.points.contains_key(&point) {
            return Err(StoreError::UnknownPoint(point));
        }
        Ok(self.links.insert((point, user)))
    }

    /// Removes a user↔point association.
    ///
    /// Returns `false` if there was nothing to remove.
    pub fn unlink(&mut self, user: AccessUserId, point: AccessPointId) -> bool {
        self.links.remove(&(point, user))
    }

    /// Returns a manager by ID.
    #[must_use]
    pub fn manager(&self, id: ManagerId) -> Option<&AccessManager> {
        self.managers.get(&id)
    }

    /// Returns a mutable manager by ID.
    pub fn manager_mut(&mut self, id: ManagerId) -> Option<&mut AccessManager> {
        self.managers.get_mut(&id)
    }

    /// Returns a point by ID.
    #[must_use]
    pub fn point(&self, id: AccessPointId) -> Option<&AccessPoint> {
        self.points.get(&id)
    }

    /// Returns a mutable point by ID.
    pub fn point_mut(&mut self, id: AccessPointId) -> Option<&mut AccessPoint> {
        self.points.get_mut(&id)
    }

    /// Finds a point by the key it presents on access checks.
    #[must_use]
    pub fn point_by_key(&self, key: &str) -> Option<&AccessPoint> {
        self.points
            .values()
            .find(|point| point.key.as_deref() == Some(key))
    }

    /// Returns a user by ID.
    #[must_use]
    pub fn user(&self, id: AccessUserId) -> Option<&AccessUser> {
        self.users.get(&id)
    }

    /// Returns a mutable user by ID.
    pub fn user_mut(&mut self, id: AccessUserId) -> Option<&mut AccessUser> {
        self.users.get_mut(&id)
    }

    /// Returns the points of a manager ordered by position, then ID.
    #[must_use]
    pub fn points_of_manager(&self, manager: ManagerId) -> Vec<&AccessPoint> {
        let mut points: Vec<_> = self
            .points
            .values()
            .filter(|point| point.manager_id == manager)
            .collect();
        points.sort_by_key(|point| (point.position, point.id));
        points
    }

    /// Iterates over the users linked to a point, in user ID order.
    pub fn users_of_point(&self, point: AccessPointId) -> impl Iterator<Item = AccessUserId> + '_ {
        self.links
            .range((point, AccessUserId::new(0))..=(point, AccessUserId::new(u64::MAX)))
            .map(|&(_, user)| user)
    }

    /// Returns true if the user may open the point.
    #[must_use]
    pub fn is_linked(&self, user: AccessUserId, point: AccessPointId) -> bool {
        self.links.contains(&(point, user))
    }

    /// Returns the number of join-table rows.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}
