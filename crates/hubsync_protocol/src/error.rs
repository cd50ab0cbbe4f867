//! Error types for protocol encoding and decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The payload does not match the message schema.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The message could not be serialized.
    #[error("encode error: {0}")]
    Encode(String),
}

impl ProtocolError {
    pub(crate) fn malformed(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }

    pub(crate) fn encode(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}
