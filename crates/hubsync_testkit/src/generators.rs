//! Property-based test generators using proptest.
//!
//! Events are generated against the standard site from
//! [`crate::fixtures`]: valid events only use the manager's own points and
//! users, so any batch they form passes admission after the given watermark.

use crate::fixtures::{
    ADA, ADA_CODE, BACK_DOOR, FOREIGN_POINT, FOREIGN_USER, FRONT_DOOR, GARAGE, GRACE, GRACE_CODE,
};
use chrono::{DateTime, Duration, Utc};
use hubsync_protocol::ReportedEvent;
use hubsync_store::{AccessPointId, AccessUserId};
use proptest::prelude::*;

/// Strategy for generating presented codes.
pub fn code_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9]{3,8}").expect("Invalid regex")
}

/// Strategy for a point of the standard manager.
pub fn own_point_strategy() -> impl Strategy<Value = AccessPointId> {
    prop_oneof![Just(FRONT_DOOR), Just(BACK_DOOR), Just(GARAGE)]
}

/// Strategy for one valid event strictly after `after`, within a day.
pub fn valid_event_strategy(after: DateTime<Utc>) -> impl Strategy<Value = ReportedEvent> {
    let grant = (
        1i64..=86_400,
        own_point_strategy(),
        prop_oneof![Just((ADA, ADA_CODE)), Just((GRACE, GRACE_CODE))],
    )
        .prop_map(move |(offset, point, (user, code))| {
            ReportedEvent::grant(after + Duration::seconds(offset), point, user, code)
        });
    let deny = (1i64..=86_400, own_point_strategy(), code_strategy()).prop_map(
        move |(offset, point, code)| {
            ReportedEvent::deny(after + Duration::seconds(offset), point, code)
        },
    );
    prop_oneof![grant, deny]
}

/// Strategy for a batch of valid events strictly after `after`.
///
/// Batches are in arbitrary time order, as devices may report them.
pub fn valid_batch_strategy(
    after: DateTime<Utc>,
    max_len: usize,
) -> impl Strategy<Value = Vec<ReportedEvent>> {
    prop::collection::vec(valid_event_strategy(after), 0..=max_len)
}

/// Which admission rule an invalid event breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidEventKind {
    /// `at` is not after the watermark.
    NotAfterWatermark,
    /// `grant` without a user.
    GrantWithoutUser,
    /// `deny` with a user.
    DenyWithUser,
    /// User of another tenant, or one that does not exist.
    UnknownUser,
    /// Point of another manager.
    ForeignAccessPoint,
}

/// Strategy for one event breaking exactly one admission rule.
pub fn invalid_event_strategy(
    after: DateTime<Utc>,
) -> impl Strategy<Value = (InvalidEventKind, ReportedEvent)> {
    let kind = prop_oneof![
        Just(InvalidEventKind::NotAfterWatermark),
        Just(InvalidEventKind::GrantWithoutUser),
        Just(InvalidEventKind::DenyWithUser),
        Just(InvalidEventKind::UnknownUser),
        Just(InvalidEventKind::ForeignAccessPoint),
    ];
    let stranger = prop_oneof![Just(FOREIGN_USER), Just(AccessUserId::new(404))];
    (kind, 0i64..=86_400, own_point_strategy(), stranger)
        .prop_map(move |(kind, offset, point, stranger)| {
            let later = after + Duration::seconds(offset.max(1));
            let event = match kind {
                InvalidEventKind::NotAfterWatermark => {
                    ReportedEvent::grant(after - Duration::seconds(offset), point, ADA, ADA_CODE)
                }
                InvalidEventKind::GrantWithoutUser => {
                    let mut event = ReportedEvent::grant(later, point, ADA, ADA_CODE);
                    event.access_user_id = None;
                    event
                }
                InvalidEventKind::DenyWithUser => {
                    let mut event = ReportedEvent::deny(later, point, "000");
                    event.access_user_id = Some(GRACE);
                    event
                }
                InvalidEventKind::UnknownUser => {
                    ReportedEvent::grant(later, point, stranger, "999")
                }
                InvalidEventKind::ForeignAccessPoint => {
                    ReportedEvent::deny(later, FOREIGN_POINT, "000")
                }
            };
            (kind, event)
        })
}
