//! Heartbeat messages.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use hubsync_store::{Access, AccessPointId, AccessUserId, ManagerId, NewAccessEvent};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::UNIX_EPOCH;

/// Returns the watermark of a manager that has no events yet.
#[must_use]
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from(UNIX_EPOCH)
}

/// The top-level key wrapping a heartbeat body.
///
/// Managers report under `"manager"`, hubs under `"hub"`. Both carry the
/// same body and are answered under the key they used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Envelope {
    /// `{"manager": {...}}`
    #[default]
    Manager,
    /// `{"hub": {...}}`
    Hub,
}

impl Envelope {
    /// Returns the JSON key of the envelope.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Envelope::Manager => "manager",
            Envelope::Hub => "hub",
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ManagerBody<T> {
    manager: T,
}

#[derive(Serialize, Deserialize)]
struct HubBody<T> {
    hub: T,
}

fn wrap<T: Serialize>(envelope: Envelope, body: &T) -> ProtocolResult<Vec<u8>> {
    match envelope {
        Envelope::Manager => serde_json::to_vec(&ManagerBody { manager: body }),
        Envelope::Hub => serde_json::to_vec(&HubBody { hub: body }),
    }
    .map_err(ProtocolError::encode)
}

fn unwrap<T: DeserializeOwned>(envelope: Envelope, bytes: &[u8]) -> ProtocolResult<T> {
    match envelope {
        Envelope::Manager => serde_json::from_slice::<ManagerBody<T>>(bytes).map(|b| b.manager),
        Envelope::Hub => serde_json::from_slice::<HubBody<T>>(bytes).map(|b| b.hub),
    }
    .map_err(ProtocolError::malformed)
}

/// One access attempt buffered by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedEvent {
    /// When the attempt happened, by the device clock.
    pub at: DateTime<Utc>,
    /// Outcome decided by the device.
    pub access: Access,
    /// Code that was presented.
    pub code: String,
    /// Matched user, `null` for denials.
    #[serde(default)]
    pub access_user_id: Option<AccessUserId>,
    /// Point where the attempt happened.
    pub access_point_id: AccessPointId,
}

impl ReportedEvent {
    /// Creates a granted attempt.
    pub fn grant(
        at: DateTime<Utc>,
        point: AccessPointId,
        user: AccessUserId,
        code: impl Into<String>,
    ) -> Self {
        Self {
            at,
            access: Access::Grant,
            code: code.into(),
            access_user_id: Some(user),
            access_point_id: point,
        }
    }

    /// Creates a denied attempt.
    pub fn deny(at: DateTime<Utc>, point: AccessPointId, code: impl Into<String>) -> Self {
        Self {
            at,
            access: Access::Deny,
            code: code.into(),
            access_user_id: None,
            access_point_id: point,
        }
    }
}

impl From<ReportedEvent> for NewAccessEvent {
    fn from(event: ReportedEvent) -> Self {
        Self {
            at: event.at,
            access: event.access,
            code: event.code,
            access_user_id: event.access_user_id,
            access_point_id: event.access_point_id,
        }
    }
}

/// Body of a heartbeat sent by a manager or hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatReport {
    /// Reporting manager or hub.
    pub id: ManagerId,
    /// Watermark returned by the last successful heartbeat; absent or
    /// `null` on the first one.
    #[serde(default)]
    pub cloud_last_access_event_at: Option<DateTime<Utc>>,
    /// Buffered events.
    pub access_events: Vec<ReportedEvent>,
}

impl HeartbeatReport {
    /// Creates a report without events.
    #[must_use]
    pub fn new(id: ManagerId, last_synced_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id,
            cloud_last_access_event_at: last_synced_at,
            access_events: Vec::new(),
        }
    }

    /// Sets the buffered events.
    #[must_use]
    pub fn with_events(mut self, events: Vec<ReportedEvent>) -> Self {
        self.access_events = events;
        self
    }

    /// Returns the device's watermark, the epoch when it has none.
    #[must_use]
    pub fn last_synced_or_epoch(&self) -> DateTime<Utc> {
        self.cloud_last_access_event_at.unwrap_or_else(epoch)
    }
}

/// A heartbeat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatRequest {
    /// Envelope the body is wrapped in.
    pub envelope: Envelope,
    /// The report.
    pub report: HeartbeatReport,
}

impl HeartbeatRequest {
    /// Creates a request wrapped in the given envelope.
    #[must_use]
    pub fn new(envelope: Envelope, report: HeartbeatReport) -> Self {
        Self { envelope, report }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        wrap(self.envelope, &self.report)
    }

    /// Decodes from JSON, expecting the given envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] on any schema violation: wrong
    /// envelope key, missing required field, wrong type, unparsable
    /// timestamp or unknown access outcome.
    pub fn decode(envelope: Envelope, bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(Self {
            envelope,
            report: unwrap(envelope, bytes)?,
        })
    }
}

/// A point a credential opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRef {
    /// Point ID.
    pub id: AccessPointId,
    /// Display name.
    pub name: String,
}

/// One valid credential in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEntry {
    /// User ID.
    pub id: AccessUserId,
    /// Display name.
    pub name: String,
    /// Access code.
    pub code: String,
    /// The device must not grant before this time, when set.
    pub activate_code_at: Option<DateTime<Utc>>,
    /// The device must not grant from this time on, when set.
    pub expire_code_at: Option<DateTime<Utc>>,
    /// Points of the reporting manager this code opens.
    pub access_points: Vec<PointRef>,
}

impl CredentialEntry {
    /// Returns true if the device may grant this code at `now` on `point`.
    #[must_use]
    pub fn opens_at(&self, point: AccessPointId, now: DateTime<Utc>) -> bool {
        self.activate_code_at.map_or(true, |activate| activate <= now)
            && self.expire_code_at.map_or(true, |expire| expire > now)
            && self.access_points.iter().any(|p| p.id == point)
    }
}

/// Body of a heartbeat response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerSnapshot {
    /// Manager or hub the snapshot is for.
    pub id: ManagerId,
    /// Server watermark after this heartbeat.
    pub cloud_last_access_event_at: DateTime<Utc>,
    /// Credentials to enforce until the next heartbeat.
    pub access_users: Vec<CredentialEntry>,
}

/// A heartbeat response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatResponse {
    /// Envelope the body is wrapped in.
    pub envelope: Envelope,
    /// The snapshot.
    pub snapshot: ManagerSnapshot,
}

impl HeartbeatResponse {
    /// Creates a response wrapped in the given envelope.
    #[must_use]
    pub fn new(envelope: Envelope, snapshot: ManagerSnapshot) -> Self {
        Self { envelope, snapshot }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        wrap(self.envelope, &self.snapshot)
    }

    /// Decodes from JSON, expecting the given envelope.
    pub fn decode(envelope: Envelope, bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(Self {
            envelope,
            snapshot: unwrap(envelope, bytes)?,
        })
    }
}
