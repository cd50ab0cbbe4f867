//! Credential snapshot builder.
//!
//! Computes the credentials a manager's points enforce offline until the
//! next heartbeat.

use chrono::{DateTime, Utc};
use hubsync_protocol::{epoch, CredentialEntry, ManagerSnapshot, PointRef};
use hubsync_store::{AccessManager, AccessUser, AccessUserId, ReadTransaction, Records};
use std::collections::BTreeMap;

/// Returns true if a user's code belongs in a snapshot at `now`.
///
/// The activation window is not checked: devices receive codes that are not
/// active yet and enforce `activateCodeAt` themselves.
fn is_distributable(user: &AccessUser, manager: &AccessManager, now: DateTime<Utc>) -> bool {
    user.enabled
        && !user.is_deleted()
        && user.is_unexpired_at(now)
        && user.tenant_id == manager.tenant_id
}

/// Builds the credential list for a manager.
///
/// Users are ordered by ID; each user's points follow the manager's point
/// order (position, then ID).
pub fn build_credentials(
    records: &Records,
    manager: &AccessManager,
    now: DateTime<Utc>,
) -> Vec<CredentialEntry> {
    let mut points_by_user: BTreeMap<AccessUserId, Vec<PointRef>> = BTreeMap::new();
    for point in records.points_of_manager(manager.id) {
        for user in records.users_of_point(point.id) {
            points_by_user.entry(user).or_default().push(PointRef {
                id: point.id,
                name: point.name.clone(),
            });
        }
    }

    points_by_user
        .into_iter()
        .filter_map(|(user_id, access_points)| {
            let user = records.user(user_id)?;
            is_distributable(user, manager, now).then(|| CredentialEntry {
                id: user.id,
                name: user.name.clone(),
                code: user.code.clone(),
                activate_code_at: user.activate_code_at,
                expire_code_at: user.expire_code_at,
                access_points,
            })
        })
        .collect()
}

/// Builds the full heartbeat snapshot from a store view.
///
/// Called on the view returned by the heartbeat's own commit, so the
/// snapshot and the watermark reflect exactly that commit.
pub fn build_snapshot(
    view: &ReadTransaction<'_>,
    manager: &AccessManager,
    now: DateTime<Utc>,
) -> ManagerSnapshot {
    ManagerSnapshot {
        id: manager.id,
        cloud_last_access_event_at: view.watermark(manager.id).unwrap_or_else(epoch),
        access_users: build_credentials(view.records(), manager, now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use hubsync_store::{AccessPoint, AccessPointId, AccessStore, ManagerId, TenantId};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn manager() -> AccessManager {
        AccessManager {
            id: ManagerId::new(7),
            tenant_id: TenantId::new(1),
            name: "Lobby".into(),
            description: String::new(),
            heartbeat_at: None,
        }
    }

    fn point(id: u64, position: u32) -> AccessPoint {
        AccessPoint {
            id: AccessPointId::new(id),
            manager_id: ManagerId::new(7),
            name: format!("door {id}"),
            position,
            key: None,
            heartbeat_at: None,
            config: None,
        }
    }

    fn user(id: u64) -> AccessUser {
        AccessUser {
            id: AccessUserId::new(id),
            tenant_id: TenantId::new(1),
            name: format!("user {id}"),
            description: String::new(),
            code: format!("{id:04}"),
            enabled: true,
            activate_code_at: None,
            expire_code_at: None,
            deleted_at: None,
        }
    }

    fn records(users: Vec<AccessUser>) -> Records {
        let mut records = Records::new();
        records.insert_manager(manager());
        // Position order differs from ID order on purpose.
        records.insert_point(point(10, 0)).unwrap();
        records.insert_point(point(9, 1)).unwrap();
        for user in users {
            let id = user.id;
            records.insert_user(user);
            records.link(id, AccessPointId::new(9)).unwrap();
            records.link(id, AccessPointId::new(10)).unwrap();
        }
        records
    }

    fn ids(entries: &[CredentialEntry]) -> Vec<u64> {
        entries.iter().map(|e| e.id.as_u64()).collect()
    }

    #[test]
    fn includes_linked_users_with_points_in_manager_order() {
        let records = records(vec![user(6), user(5)]);
        let entries = build_credentials(&records, &manager(), now());

        assert_eq!(ids(&entries), vec![5, 6]);
        let points: Vec<_> = entries[0].access_points.iter().map(|p| p.id).collect();
        assert_eq!(points, vec![AccessPointId::new(10), AccessPointId::new(9)]);
    }

    #[test]
    fn excludes_deleted_disabled_and_expired() {
        let mut deleted = user(1);
        deleted.deleted_at = Some(now() - Duration::days(1));
        let mut disabled = user(2);
        disabled.enabled = false;
        let mut expired = user(3);
        expired.expire_code_at = Some(now());
        let mut expiring = user(4);
        expiring.expire_code_at = Some(now() + Duration::seconds(1));

        let records = records(vec![deleted, disabled, expired, expiring]);
        assert_eq!(ids(&build_credentials(&records, &manager(), now())), vec![4]);
    }

    #[test]
    fn keeps_codes_that_are_not_active_yet() {
        let mut future = user(8);
        future.activate_code_at = Some(now() + Duration::days(3));

        let entries = build_credentials(&records(vec![future]), &manager(), now());
        assert_eq!(ids(&entries), vec![8]);
        assert_eq!(entries[0].activate_code_at, Some(now() + Duration::days(3)));
    }

    #[test]
    fn excludes_users_of_another_tenant() {
        let mut foreign = user(9);
        foreign.tenant_id = TenantId::new(2);
        assert!(build_credentials(&records(vec![foreign]), &manager(), now()).is_empty());
    }

    #[test]
    fn excludes_unlinked_users() {
        let mut records = records(vec![user(5)]);
        records.insert_user(user(6));
        assert_eq!(ids(&build_credentials(&records, &manager(), now())), vec![5]);

        records.unlink(AccessUserId::new(5), AccessPointId::new(9));
        let entries = build_credentials(&records, &manager(), now());
        assert_eq!(entries[0].access_points.len(), 1);
    }

    #[test]
    fn empty_store_snapshot_has_epoch_watermark() {
        let store = AccessStore::in_memory(records(vec![user(5)]));
        let snapshot = build_snapshot(&store.read(), &manager(), now());

        assert_eq!(snapshot.id, ManagerId::new(7));
        assert_eq!(snapshot.cloud_last_access_event_at, epoch());
        assert_eq!(snapshot.access_users.len(), 1);
    }
}
