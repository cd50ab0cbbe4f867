//! # hubsync Agent
//!
//! The device side of the hubsync heartbeat protocol, for managers and hubs
//! that keep working while the uplink is down.
//!
//! This crate provides:
//! - An event buffer ordered by occurrence time
//! - The heartbeat cycle with watermark bookkeeping
//! - Offline access decisions from the cached credential snapshot
//! - Retry with exponential backoff
//! - A transport abstraction with an HTTP implementation
//!
//! # Heartbeat cycle
//!
//! 1. The oldest buffered events are sent with the last watermark received
//! 2. On success the sent events leave the buffer; whether the server
//!    admitted them or discarded them as stale is read off the returned
//!    watermark
//! 3. The watermark and the credential snapshot are replaced
//! 4. If the server rejects the batch, the sent events are flushed so the
//!    device resynchronises on its next heartbeat
//!
//! Network failures keep the buffer for the next attempt.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod agent;
mod config;
mod error;
mod http;
mod transport;

pub use agent::{AgentStats, HeartbeatAgent, HeartbeatCycleResult};
pub use config::{AgentConfig, RetryConfig};
pub use error::{AgentError, AgentResult};
pub use http::{HttpClient, HttpResponse, HttpTransport};
pub use transport::{HeartbeatTransport, MockTransport};
