//! Error types for the access store.

use crate::types::{AccessPointId, AccessUserId, ManagerId};
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A journal frame could not be encoded.
    #[error("journal encode error: {0}")]
    Encode(String),

    /// The journal is corrupted.
    #[error("journal corruption at offset {offset}: {message}")]
    Corrupted {
        /// Byte offset of the bad frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// The journal file is locked by another process.
    #[error("journal is locked by another process: {0}")]
    Locked(String),

    /// A referenced manager does not exist.
    #[error("unknown {0}")]
    UnknownManager(ManagerId),

    /// A referenced access point does not exist.
    #[error("unknown {0}")]
    UnknownPoint(AccessPointId),

    /// A referenced user does not exist.
    #[error("unknown {0}")]
    UnknownUser(AccessUserId),

    /// A seed file is inconsistent.
    #[error("invalid seed: {0}")]
    InvalidSeed(String),
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Returns true if the error refers to a missing record.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::UnknownManager(_) | StoreError::UnknownPoint(_) | StoreError::UnknownUser(_)
        )
    }
}
