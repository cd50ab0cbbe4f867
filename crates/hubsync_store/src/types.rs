//! Access-control entities and their identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Creates a new identifier.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw ID value.
            #[must_use]
            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of an account (tenant) owning managers and users.
    TenantId,
    "tenant"
);
record_id!(
    /// Identifier of an access manager or hub.
    ManagerId,
    "manager"
);
record_id!(
    /// Identifier of a physical access point (reader or lock).
    AccessPointId,
    "point"
);
record_id!(
    /// Identifier of a credential holder.
    AccessUserId,
    "user"
);
record_id!(
    /// Identifier assigned to an access event when it is appended.
    ///
    /// Event IDs increase with commit order and are never reused.
    EventId,
    "event"
);

/// Outcome of an access attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    /// The presented code opened the point.
    Grant,
    /// The presented code was refused.
    Deny,
}

impl Access {
    /// Returns the wire name of the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Access::Grant => "grant",
            Access::Deny => "deny",
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical controller grouping access points. Hubs share this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessManager {
    /// Manager ID.
    pub id: ManagerId,
    /// Owning account.
    pub tenant_id: TenantId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Time of the last heartbeat received from this manager.
    #[serde(default)]
    pub heartbeat_at: Option<DateTime<Utc>>,
}

/// How a stand-alone point answers access checks from its cached configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessCheckPolicy {
    /// Grant when the presented code equals the cached code.
    #[default]
    MatchCode,
    /// Deny every attempt.
    Lockdown,
}

/// Configuration last pushed to an access point.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointConfig {
    /// The single cached code the point compares against.
    #[serde(default)]
    pub code: Option<String>,
    /// Access-check policy.
    #[serde(default)]
    pub policy: AccessCheckPolicy,
}

/// A physical reader or lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPoint {
    /// Point ID.
    pub id: AccessPointId,
    /// Manager this point belongs to.
    pub manager_id: ManagerId,
    /// Display name.
    pub name: String,
    /// Ordering within the manager.
    #[serde(default)]
    pub position: u32,
    /// Key a stand-alone point identifies itself with on access checks.
    #[serde(default)]
    pub key: Option<String>,
    /// Time of the last check-in by this point.
    #[serde(default)]
    pub heartbeat_at: Option<DateTime<Utc>>,
    /// Cached configuration.
    #[serde(default)]
    pub config: Option<PointConfig>,
}

/// A credential holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessUser {
    /// User ID.
    pub id: AccessUserId,
    /// Owning account.
    pub tenant_id: TenantId,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Access code (digits).
    pub code: String,
    /// Whether the code is enabled at all.
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Code is not valid before this time, when set.
    #[serde(default)]
    pub activate_code_at: Option<DateTime<Utc>>,
    /// Code is not valid from this time on, when set.
    #[serde(default)]
    pub expire_code_at: Option<DateTime<Utc>>,
    /// Soft-delete marker.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

fn enabled_default() -> bool {
    true
}

impl AccessUser {
    /// Returns true if the user has been soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns true if the code has not expired at `now`.
    #[must_use]
    pub fn is_unexpired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_code_at.map_or(true, |expire| expire > now)
    }
}

/// An access event waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccessEvent {
    /// When the attempt happened, by the device clock.
    pub at: DateTime<Utc>,
    /// Outcome.
    pub access: Access,
    /// Code that was presented.
    pub code: String,
    /// Matched user; present exactly when `access` is `Grant`.
    pub access_user_id: Option<AccessUserId>,
    /// Point where the attempt happened.
    pub access_point_id: AccessPointId,
}

/// An immutable audit record of one access attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
    /// Event ID, assigned at append.
    pub id: EventId,
    /// Manager that reported the event.
    pub manager_id: ManagerId,
    /// When the attempt happened, by the device clock.
    pub at: DateTime<Utc>,
    /// Outcome.
    pub access: Access,
    /// Code that was presented.
    pub code: String,
    /// Matched user.
    pub access_user_id: Option<AccessUserId>,
    /// Point where the attempt happened.
    pub access_point_id: AccessPointId,
}

impl AccessEvent {
    /// Builds the stored record from a staged event.
    #[must_use]
    pub fn from_new(id: EventId, manager_id: ManagerId, event: NewAccessEvent) -> Self {
        Self {
            id,
            manager_id,
            at: event.at,
            access: event.access,
            code: event.code,
            access_user_id: event.access_user_id,
            access_point_id: event.access_point_id,
        }
    }
}
