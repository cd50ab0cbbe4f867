//! # hubsync Server
//!
//! Heartbeat reconciliation server for access-control managers and hubs.
//!
//! This crate provides:
//! - The heartbeat reconciler: watermark check, event validation, append
//! - The credential snapshot builder
//! - Point-level access checks for stand-alone points
//! - HTTP endpoints (axum) for both heartbeat envelopes and access checks
//!
//! # Protocol
//!
//! A device reports periodically with the watermark it last received and
//! the access events it buffered since:
//! 1. The manager is resolved (and scoped to the caller's tenant, if given)
//! 2. If the device watermark equals the server's, the events are validated
//!    as a batch and appended; otherwise they are discarded as stale
//! 3. The manager's heartbeat time is recorded in the same commit
//! 4. The device receives the new watermark and its credential snapshot
//!
//! A batch with one bad event is rejected as a whole and nothing is
//! written. A stale batch is not an error: the response simply carries the
//! unchanged watermark, telling the device to flush and resynchronise.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod access_check;
mod clock;
mod config;
mod error;
mod http;
mod reconciler;
mod server;
mod snapshot;

pub use access_check::{decide, PointAccessChecker};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServerConfig;
pub use error::{EventViolation, ServerError, ServerResult};
pub use http::{router, TENANT_HEADER};
pub use reconciler::{HeartbeatOutcome, HeartbeatReconciler};
pub use server::HeartbeatServer;
pub use snapshot::{build_credentials, build_snapshot};
