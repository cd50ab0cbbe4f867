//! # hubsync Protocol
//!
//! Wire messages exchanged between edge devices and the hubsync server.
//!
//! This crate provides:
//! - Heartbeat request/response for the `manager` and `hub` envelopes
//! - The credential snapshot returned to devices
//! - The point-level access check
//! - JSON encoding/decoding with schema errors reported as
//!   [`ProtocolError::Malformed`]
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod access_check;
mod error;
mod messages;

pub use access_check::{AccessCheckRequest, AccessCheckResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    epoch, CredentialEntry, Envelope, HeartbeatReport, HeartbeatRequest, HeartbeatResponse,
    ManagerSnapshot, PointRef, ReportedEvent,
};

/// HTTP paths of the protocol endpoints.
pub mod paths {
    use crate::Envelope;

    /// Heartbeat of a manager.
    pub const MANAGER_HEARTBEAT: &str = "/api/v1/managers/heartbeat";
    /// Heartbeat of a hub.
    pub const HUB_HEARTBEAT: &str = "/api/v1/hubs/heartbeat";
    /// Access check of a stand-alone point.
    pub const POINT_ACCESS: &str = "/api/v1/points/access";
    /// Liveness probe.
    pub const HEALTH: &str = "/health";

    /// Returns the heartbeat path for an envelope.
    #[must_use]
    pub const fn heartbeat(envelope: Envelope) -> &'static str {
        match envelope {
            Envelope::Manager => MANAGER_HEARTBEAT,
            Envelope::Hub => HUB_HEARTBEAT,
        }
    }
}
