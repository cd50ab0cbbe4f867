//! Test fixtures and store helpers.
//!
//! The standard site is one tenant with manager 7, its points 9, 10 and 11,
//! and users 5 and 6. A second tenant owns manager 8, point 999 and user 50.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hubsync_store::{
    AccessCheckPolicy, AccessManager, AccessPoint, AccessPointId, AccessStore, AccessUser,
    AccessUserId, EventJournal, FileJournal, ManagerId, MemoryJournal, PointConfig, PointUserLink,
    Records, Seed, TenantId,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Tenant owning the standard site.
pub const TENANT: TenantId = TenantId::new(1);
/// The standard manager.
pub const MANAGER: ManagerId = ManagerId::new(7);
/// Front door, position 0, answers access checks with a cached code.
pub const FRONT_DOOR: AccessPointId = AccessPointId::new(9);
/// Back door, position 1.
pub const BACK_DOOR: AccessPointId = AccessPointId::new(10);
/// Garage, position 2, in lockdown.
pub const GARAGE: AccessPointId = AccessPointId::new(11);
/// User linked to the front and back doors.
pub const ADA: AccessUserId = AccessUserId::new(5);
/// User linked to the back door only.
pub const GRACE: AccessUserId = AccessUserId::new(6);

/// Code of [`ADA`].
pub const ADA_CODE: &str = "123";
/// Code of [`GRACE`].
pub const GRACE_CODE: &str = "4567";
/// Key the front door presents on access checks.
pub const FRONT_DOOR_KEY: &str = "front-door";
/// Code cached on the front door.
pub const FRONT_DOOR_CODE: &str = "2468";
/// Key the garage presents on access checks.
pub const GARAGE_KEY: &str = "garage";

/// Tenant owning the foreign site.
pub const FOREIGN_TENANT: TenantId = TenantId::new(2);
/// Manager of the foreign tenant.
pub const FOREIGN_MANAGER: ManagerId = ManagerId::new(8);
/// Point of the foreign manager.
pub const FOREIGN_POINT: AccessPointId = AccessPointId::new(999);
/// User of the foreign tenant.
pub const FOREIGN_USER: AccessUserId = AccessUserId::new(50);

/// 2024-01-01T00:00:00Z, the first event time in most scenarios.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Returns [`t0`] shifted by `seconds`.
pub fn at(seconds: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(seconds)
}

fn manager(id: ManagerId, tenant_id: TenantId, name: &str) -> AccessManager {
    AccessManager {
        id,
        tenant_id,
        name: name.into(),
        description: String::new(),
        heartbeat_at: None,
    }
}

fn point(id: AccessPointId, manager_id: ManagerId, name: &str, position: u32) -> AccessPoint {
    AccessPoint {
        id,
        manager_id,
        name: name.into(),
        position,
        key: None,
        heartbeat_at: None,
        config: None,
    }
}

/// Builds an enabled user without an activation window.
pub fn user(id: AccessUserId, tenant_id: TenantId, name: &str, code: &str) -> AccessUser {
    AccessUser {
        id,
        tenant_id,
        name: name.into(),
        description: String::new(),
        code: code.into(),
        enabled: true,
        activate_code_at: None,
        expire_code_at: None,
        deleted_at: None,
    }
}

fn link(access_user_id: AccessUserId, access_point_id: AccessPointId) -> PointUserLink {
    PointUserLink {
        access_point_id,
        access_user_id,
    }
}

/// Returns the standard site as a seed.
pub fn standard_seed() -> Seed {
    let mut front = point(FRONT_DOOR, MANAGER, "Front door", 0);
    front.key = Some(FRONT_DOOR_KEY.into());
    front.config = Some(PointConfig {
        code: Some(FRONT_DOOR_CODE.into()),
        policy: AccessCheckPolicy::MatchCode,
    });
    let mut garage = point(GARAGE, MANAGER, "Garage", 2);
    garage.key = Some(GARAGE_KEY.into());
    garage.config = Some(PointConfig {
        code: Some(FRONT_DOOR_CODE.into()),
        policy: AccessCheckPolicy::Lockdown,
    });

    Seed {
        managers: vec![
            manager(MANAGER, TENANT, "Lobby"),
            manager(FOREIGN_MANAGER, FOREIGN_TENANT, "Warehouse"),
        ],
        points: vec![
            front,
            point(BACK_DOOR, MANAGER, "Back door", 1),
            garage,
            point(FOREIGN_POINT, FOREIGN_MANAGER, "Loading bay", 0),
        ],
        users: vec![
            user(ADA, TENANT, "Ada", ADA_CODE),
            user(GRACE, TENANT, "Grace", GRACE_CODE),
            user(FOREIGN_USER, FOREIGN_TENANT, "Mallory", "999"),
        ],
        links: vec![
            link(ADA, FRONT_DOOR),
            link(ADA, BACK_DOOR),
            link(GRACE, BACK_DOOR),
            link(FOREIGN_USER, FOREIGN_POINT),
        ],
    }
}

/// Returns the standard site as record tables.
pub fn standard_records() -> Records {
    Records::from_seed(standard_seed()).expect("standard seed is consistent")
}

/// Writes a seed as JSON into `dir` and returns its path.
pub fn write_seed(dir: &Path, seed: &Seed) -> PathBuf {
    let path = dir.join("seed.json");
    let json = serde_json::to_vec_pretty(seed).expect("seed serializes");
    std::fs::write(&path, json).expect("Failed to write seed file");
    path
}

/// An access store over the standard site with automatic cleanup.
pub struct TestStore {
    /// The store.
    pub store: Arc<AccessStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a store with an in-memory journal.
    pub fn memory() -> Self {
        Self::with_records(standard_records())
    }

    /// Creates a store over the given records with an in-memory journal.
    pub fn with_records(records: Records) -> Self {
        let journal: Box<dyn EventJournal> = Box::new(MemoryJournal::new());
        Self {
            store: Arc::new(AccessStore::open(journal, records).expect("Failed to open store")),
            temp_dir: None,
        }
    }

    /// Creates a store with a journal file in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = open_file_store(&temp_dir.path().join("events.journal"));
        Self {
            store,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the journal path if file-based, None if in-memory.
    pub fn journal_path(&self) -> Option<PathBuf> {
        self.temp_dir
            .as_ref()
            .map(|dir| dir.path().join("events.journal"))
    }

    /// Closes and reopens a file-based store, replaying its journal.
    ///
    /// Panics if other clones of the store are still alive, since they hold
    /// the journal lock.
    pub fn reopen(self) -> Self {
        let path = self.journal_path().expect("only file stores can be reopened");
        let Self { store, temp_dir } = self;
        assert_eq!(
            Arc::strong_count(&store),
            1,
            "store is still shared; drop every clone before reopening"
        );
        drop(store);
        Self {
            store: open_file_store(&path),
            temp_dir,
        }
    }
}

fn open_file_store(path: &Path) -> Arc<AccessStore> {
    let journal = FileJournal::open(path).expect("Failed to open journal");
    Arc::new(AccessStore::open(Box::new(journal), standard_records()).expect("Failed to open store"))
}

impl std::ops::Deref for TestStore {
    type Target = AccessStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_site_is_consistent() {
        let records = standard_records();
        assert_eq!(records.points_of_manager(MANAGER).len(), 3);
        assert!(records.is_linked(ADA, FRONT_DOOR));
        assert!(!records.is_linked(GRACE, FRONT_DOOR));
        assert_eq!(records.point_by_key(FRONT_DOOR_KEY).map(|p| p.id), Some(FRONT_DOOR));
        assert_eq!(records.link_count(), 4);
    }

    #[test]
    fn file_store_survives_reopen() {
        let store = TestStore::file();
        assert!(store.journal_path().is_some());

        let mut tx = store.begin_write();
        tx.touch_manager(MANAGER, at(60)).unwrap();
        drop(tx.commit().unwrap());

        let store = store.reopen();
        let view = store.read();
        assert_eq!(view.records().manager(MANAGER).unwrap().heartbeat_at, Some(at(60)));
    }

    #[test]
    fn seed_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = write_seed(dir.path(), &standard_seed());
        let seed: Seed = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(seed, standard_seed());
    }
}
