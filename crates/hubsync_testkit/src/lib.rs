//! # hubsync Testkit
//!
//! Test utilities for hubsync.
//!
//! This crate provides:
//! - A standard seeded site (tenant, manager, points, users, links) plus a
//!   foreign tenant to test isolation against
//! - Stores backed by a memory or temporary-file journal
//! - Property-based generators for heartbeat event batches
//!
//! ## Usage
//!
//! ```rust
//! use hubsync_testkit::prelude::*;
//!
//! let store = TestStore::memory();
//! assert_eq!(store.event_count(), 0);
//! assert!(store.read().records().manager(MANAGER).is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
