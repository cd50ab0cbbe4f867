//! # hubsync Store
//!
//! Access-control records and the append-only access event store.
//!
//! This crate provides:
//! - The data model: managers (and hubs), access points, users, events
//! - The user↔point association as an explicit join table
//! - An append-only event store with per-manager watermarks
//! - Journal backends ([`MemoryJournal`], [`FileJournal`]) for durability
//! - Single-writer transactions with read-after-write views
//!
//! ## Invariants
//!
//! - Access events are never mutated or deleted once committed
//! - A manager's watermark is the maximum `at` among its stored events
//! - A commit is all-or-nothing: one journal frame per transaction
//!
//! ## Example
//!
//! ```rust
//! use hubsync_store::{AccessStore, Records};
//!
//! let store = AccessStore::in_memory(Records::new());
//! assert_eq!(store.event_count(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod error;
mod journal;
mod records;
mod store;
mod types;

pub use error::{StoreError, StoreResult};
pub use journal::{
    compute_crc32, decode_frames, encode_frame, DecodedJournal, EventJournal, FileJournal,
    HeartbeatMark, HeartbeatTarget, JournalEntry, MemoryJournal, JOURNAL_MAGIC, JOURNAL_VERSION,
};
pub use records::{PointUserLink, Records, Seed};
pub use store::{AccessStore, ReadTransaction, WriteTransaction};
pub use types::{
    Access, AccessCheckPolicy, AccessEvent, AccessManager, AccessPoint, AccessPointId, AccessUser,
    AccessUserId, EventId, ManagerId, NewAccessEvent, PointConfig, TenantId,
};
