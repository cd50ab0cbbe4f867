//! Heartbeat reconciliation.
//!
//! A heartbeat carries the device's watermark and its buffered events. The
//! events are admitted only when the device's watermark equals the server's;
//! otherwise the device is behind and its batch is discarded. Either way the
//! manager's heartbeat time is recorded and a fresh credential snapshot is
//! returned, read from the view of the same commit.

use crate::clock::Clock;
use crate::error::{EventViolation, ServerError, ServerResult};
use crate::snapshot::build_snapshot;
use chrono::{DateTime, Utc};
use hubsync_protocol::{epoch, HeartbeatReport, ManagerSnapshot, ReportedEvent};
use hubsync_store::{Access, AccessManager, AccessStore, ManagerId, Records, TenantId};
use std::sync::Arc;

/// Result of a processed heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatOutcome {
    /// Snapshot to return to the device.
    pub snapshot: ManagerSnapshot,
    /// Number of events appended to the store.
    pub admitted: usize,
    /// Number of events dropped because the device watermark was stale.
    pub discarded: usize,
    /// Whether the device watermark differed from the server's.
    pub stale: bool,
}

/// Resolves the reporting manager, honouring the tenant scope.
///
/// A manager owned by another tenant is reported exactly like a missing one.
fn resolve_manager(
    records: &Records,
    id: ManagerId,
    scope: Option<TenantId>,
) -> ServerResult<AccessManager> {
    records
        .manager(id)
        .filter(|manager| scope.map_or(true, |tenant| manager.tenant_id == tenant))
        .cloned()
        .ok_or_else(|| ServerError::NotFound(id.to_string()))
}

/// Checks one event against the admission rules, in rule order.
fn validate_event(
    records: &Records,
    manager: &AccessManager,
    last_synced: DateTime<Utc>,
    event: &ReportedEvent,
) -> Result<(), EventViolation> {
    if event.at <= last_synced {
        return Err(EventViolation::NotAfterWatermark);
    }

    match (event.access, event.access_user_id) {
        (Access::Grant, None) => return Err(EventViolation::GrantWithoutUser),
        (Access::Deny, Some(_)) => return Err(EventViolation::DenyWithUser),
        _ => {}
    }

    // Soft-deleted users stay known: the event may predate the deletion.
    if let Some(user) = event.access_user_id {
        let known = records
            .user(user)
            .is_some_and(|u| u.tenant_id == manager.tenant_id);
        if !known {
            return Err(EventViolation::UnknownUser(user));
        }
    }

    let owned = records
        .point(event.access_point_id)
        .is_some_and(|p| p.manager_id == manager.id);
    if !owned {
        return Err(EventViolation::ForeignAccessPoint(event.access_point_id));
    }

    Ok(())
}

/// Processes heartbeats against the access store.
///
/// # Concurrency
///
/// Each heartbeat runs inside the store's single write transaction. Two
/// heartbeats for the same manager submitted with the same watermark are
/// serialised: the first admits its batch and advances the watermark, the
/// second then finds its watermark stale and its batch is discarded. Devices
/// keep one heartbeat in flight, so this only happens on misbehaving or
/// duplicated devices.
pub struct HeartbeatReconciler {
    store: Arc<AccessStore>,
    clock: Arc<dyn Clock>,
    max_events: usize,
}

impl HeartbeatReconciler {
    /// Creates a reconciler.
    pub fn new(store: Arc<AccessStore>, clock: Arc<dyn Clock>, max_events: usize) -> Self {
        Self {
            store,
            clock,
            max_events,
        }
    }

    /// Processes one heartbeat.
    ///
    /// # Errors
    ///
    /// - [`ServerError::InvalidRequest`] if the batch exceeds the event limit
    /// - [`ServerError::NotFound`] if the manager does not resolve in `scope`
    /// - [`ServerError::InvalidEvent`] if any event breaks an admission rule
    /// - [`ServerError::Store`] if the commit fails
    ///
    /// On error nothing is written, including the heartbeat time.
    pub fn reconcile(
        &self,
        report: HeartbeatReport,
        scope: Option<TenantId>,
    ) -> ServerResult<HeartbeatOutcome> {
        let submitted = report.access_events.len();
        if submitted > self.max_events {
            return Err(ServerError::InvalidRequest(format!(
                "{submitted} events exceed the limit of {} per heartbeat",
                self.max_events
            )));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin_write();
        let manager = resolve_manager(tx.records(), report.id, scope)?;

        let watermark = tx.watermark(manager.id).unwrap_or_else(epoch);
        let last_synced = report.last_synced_or_epoch();
        let stale = last_synced != watermark;

        if stale {
            if submitted > 0 {
                tracing::warn!(
                    manager = %manager.id,
                    device_watermark = %last_synced,
                    server_watermark = %watermark,
                    discarded = submitted,
                    "stale watermark, discarding reported events"
                );
            }
        } else {
            for (index, event) in report.access_events.iter().enumerate() {
                if let Err(violation) = validate_event(tx.records(), &manager, last_synced, event) {
                    tracing::warn!(
                        manager = %manager.id,
                        index,
                        %violation,
                        "rejecting heartbeat batch"
                    );
                    return Err(ServerError::InvalidEvent { index, violation });
                }
            }
            for event in report.access_events {
                tx.append_event(manager.id, event.into());
            }
        }

        let admitted = tx.staged_events();
        tx.touch_manager(manager.id, now)?;
        let view = tx.commit()?;
        let snapshot = build_snapshot(&view, &manager, now);

        if admitted > 0 {
            tracing::info!(
                manager = %manager.id,
                admitted,
                watermark = %snapshot.cloud_last_access_event_at,
                "admitted access events"
            );
        }
        tracing::debug!(
            manager = %manager.id,
            credentials = snapshot.access_users.len(),
            stale,
            "heartbeat processed"
        );

        Ok(HeartbeatOutcome {
            snapshot,
            admitted,
            discarded: if stale { submitted } else { 0 },
            stale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};
    use hubsync_store::{AccessPoint, AccessPointId, AccessUser, AccessUserId};

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn records() -> Records {
        let mut records = Records::new();
        for (id, tenant) in [(7, 1), (8, 2)] {
            records.insert_manager(AccessManager {
                id: ManagerId::new(id),
                tenant_id: TenantId::new(tenant),
                name: format!("manager {id}"),
                description: String::new(),
                heartbeat_at: None,
            });
        }
        for (id, manager) in [(9, 7), (999, 8)] {
            records
                .insert_point(AccessPoint {
                    id: AccessPointId::new(id),
                    manager_id: ManagerId::new(manager),
                    name: format!("door {id}"),
                    position: 0,
                    key: None,
                    heartbeat_at: None,
                    config: None,
                })
                .unwrap();
        }
        for (id, tenant) in [(5, 1), (50, 2)] {
            records.insert_user(AccessUser {
                id: AccessUserId::new(id),
                tenant_id: TenantId::new(tenant),
                name: format!("user {id}"),
                description: String::new(),
                code: "123".into(),
                enabled: true,
                activate_code_at: None,
                expire_code_at: None,
                deleted_at: None,
            });
        }
        records.link(AccessUserId::new(5), AccessPointId::new(9)).unwrap();
        records
    }

    fn reconciler(max_events: usize) -> (HeartbeatReconciler, Arc<AccessStore>, Arc<ManualClock>) {
        let store = Arc::new(AccessStore::in_memory(records()));
        let clock = Arc::new(ManualClock::new(t(600)));
        let reconciler = HeartbeatReconciler::new(Arc::clone(&store), clock.clone(), max_events);
        (reconciler, store, clock)
    }

    fn grant(minute: i64) -> ReportedEvent {
        ReportedEvent::grant(t(minute), AccessPointId::new(9), AccessUserId::new(5), "123")
    }

    fn report(last: Option<DateTime<Utc>>, events: Vec<ReportedEvent>) -> HeartbeatReport {
        HeartbeatReport::new(ManagerId::new(7), last).with_events(events)
    }

    fn rejection(result: ServerResult<HeartbeatOutcome>) -> (usize, EventViolation) {
        match result {
            Err(ServerError::InvalidEvent { index, violation }) => (index, violation),
            other => panic!("expected an invalid event, got {other:?}"),
        }
    }

    #[test]
    fn first_heartbeat_admits_events() {
        let (reconciler, store, _) = reconciler(10);

        let outcome = reconciler.reconcile(report(None, vec![grant(0)]), None).unwrap();

        assert_eq!(outcome.admitted, 1);
        assert!(!outcome.stale);
        assert_eq!(outcome.snapshot.cloud_last_access_event_at, t(0));
        assert_eq!(outcome.snapshot.access_users.len(), 1);
        assert_eq!(store.event_count(), 1);
        let view = store.read();
        let manager = view.records().manager(ManagerId::new(7)).unwrap();
        assert_eq!(manager.heartbeat_at, Some(t(600)));
    }

    #[test]
    fn epoch_and_null_watermarks_are_equivalent() {
        let (reconciler, store, _) = reconciler(10);
        reconciler
            .reconcile(report(Some(epoch()), vec![grant(0)]), None)
            .unwrap();
        assert_eq!(store.event_count(), 1);
    }

    #[test]
    fn stale_watermark_discards_but_touches_heartbeat() {
        let (reconciler, store, clock) = reconciler(10);
        reconciler.reconcile(report(None, vec![grant(5)]), None).unwrap();
        clock.advance(Duration::minutes(1));

        let outcome = reconciler
            .reconcile(report(Some(t(1)), vec![grant(6), grant(7)]), None)
            .unwrap();

        assert!(outcome.stale);
        assert_eq!(outcome.admitted, 0);
        assert_eq!(outcome.discarded, 2);
        assert_eq!(outcome.snapshot.cloud_last_access_event_at, t(5));
        assert_eq!(store.event_count(), 1);
        let view = store.read();
        let manager = view.records().manager(ManagerId::new(7)).unwrap();
        assert_eq!(manager.heartbeat_at, Some(t(601)));
    }

    #[test]
    fn batch_order_within_heartbeat_is_free() {
        let (reconciler, _, _) = reconciler(10);
        let outcome = reconciler
            .reconcile(report(None, vec![grant(9), grant(3)]), None)
            .unwrap();
        assert_eq!(outcome.admitted, 2);
        assert_eq!(outcome.snapshot.cloud_last_access_event_at, t(9));
    }

    #[test]
    fn event_at_watermark_is_rejected() {
        let (reconciler, _, _) = reconciler(10);
        reconciler.reconcile(report(None, vec![grant(5)]), None).unwrap();

        let result = reconciler.reconcile(report(Some(t(5)), vec![grant(6), grant(5)]), None);
        assert_eq!(rejection(result), (1, EventViolation::NotAfterWatermark));
    }

    #[test]
    fn grant_and_deny_user_rules() {
        let (reconciler, _, _) = reconciler(10);

        let mut no_user = grant(1);
        no_user.access_user_id = None;
        let result = reconciler.reconcile(report(None, vec![no_user]), None);
        assert_eq!(rejection(result), (0, EventViolation::GrantWithoutUser));

        let mut deny = ReportedEvent::deny(t(1), AccessPointId::new(9), "000");
        deny.access_user_id = Some(AccessUserId::new(5));
        let result = reconciler.reconcile(report(None, vec![deny]), None);
        assert_eq!(rejection(result), (0, EventViolation::DenyWithUser));
    }

    #[test]
    fn users_must_belong_to_the_tenant() {
        let (reconciler, _, _) = reconciler(10);
        for user in [50, 404] {
            let event = ReportedEvent::grant(t(1), AccessPointId::new(9), AccessUserId::new(user), "1");
            let result = reconciler.reconcile(report(None, vec![event]), None);
            assert_eq!(
                rejection(result),
                (0, EventViolation::UnknownUser(AccessUserId::new(user)))
            );
        }
    }

    #[test]
    fn foreign_point_rejects_whole_batch() {
        let (reconciler, store, _) = reconciler(10);
        let foreign = ReportedEvent::deny(t(2), AccessPointId::new(999), "000");

        let result = reconciler.reconcile(report(None, vec![grant(1), foreign]), None);

        assert_eq!(
            rejection(result),
            (1, EventViolation::ForeignAccessPoint(AccessPointId::new(999)))
        );
        assert_eq!(store.event_count(), 0);
        assert_eq!(store.watermark(ManagerId::new(7)), None);
        let view = store.read();
        assert!(view.records().manager(ManagerId::new(7)).unwrap().heartbeat_at.is_none());
    }

    #[test]
    fn unknown_manager_is_not_found() {
        let (reconciler, _, _) = reconciler(10);
        let result = reconciler.reconcile(HeartbeatReport::new(ManagerId::new(404), None), None);
        assert!(matches!(result, Err(ServerError::NotFound(_))));
    }

    #[test]
    fn tenant_scope_hides_foreign_managers() {
        let (reconciler, _, _) = reconciler(10);
        let scoped = reconciler.reconcile(report(None, vec![]), Some(TenantId::new(2)));
        assert!(matches!(scoped, Err(ServerError::NotFound(_))));

        let own = reconciler.reconcile(report(None, vec![]), Some(TenantId::new(1)));
        assert!(own.is_ok());
    }

    #[test]
    fn oversized_batch_is_invalid_request() {
        let (reconciler, store, _) = reconciler(2);
        let result = reconciler.reconcile(report(None, vec![grant(1), grant(2), grant(3)]), None);
        assert!(matches!(result, Err(ServerError::InvalidRequest(_))));
        assert_eq!(store.journal_size(), 0);
    }

    #[test]
    fn soft_deleted_user_is_still_known_for_events() {
        let (reconciler, store, _) = reconciler(10);
        store.update_records(|records| {
            if let Some(user) = records.user_mut(AccessUserId::new(5)) {
                user.deleted_at = Some(t(100));
            }
        });

        let outcome = reconciler.reconcile(report(None, vec![grant(1)]), None).unwrap();
        assert_eq!(outcome.admitted, 1);
        assert!(outcome.snapshot.access_users.is_empty());
    }
}
