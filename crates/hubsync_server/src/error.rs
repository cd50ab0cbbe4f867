//! Error types for the heartbeat server.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use hubsync_protocol::ProtocolError;
use hubsync_store::{AccessPointId, AccessUserId, StoreError};
use std::fmt;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Why a reported event was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventViolation {
    /// `at` is not strictly after the device's watermark.
    NotAfterWatermark,
    /// A `grant` without a user reference.
    GrantWithoutUser,
    /// A `deny` with a user reference.
    DenyWithUser,
    /// The user does not exist in the manager's tenant.
    UnknownUser(AccessUserId),
    /// The point does not belong to the reporting manager.
    ForeignAccessPoint(AccessPointId),
}

impl fmt::Display for EventViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAfterWatermark => f.write_str("timestamp is not after the last synced event"),
            Self::GrantWithoutUser => f.write_str("grant event has no user"),
            Self::DenyWithUser => f.write_str("deny event carries a user"),
            Self::UnknownUser(user) => write!(f, "{user} is not known to this tenant"),
            Self::ForeignAccessPoint(point) => {
                write!(f, "{point} does not belong to this manager")
            }
        }
    }
}

/// Errors that can occur in the heartbeat server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The manager, hub or point does not resolve.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request does not match the wire schema or server limits.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An event in the batch breaks an admission rule; nothing was written.
    #[error("invalid event at index {index}: {violation}")]
    InvalidEvent {
        /// Position of the event in the submitted batch.
        index: usize,
        /// The rule it broke.
        violation: EventViolation,
    },

    /// Store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Malformed(message) => Self::InvalidRequest(message),
            ProtocolError::Encode(message) => Self::Internal(message),
        }
    }
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::NotFound(_)
                | ServerError::InvalidRequest(_)
                | ServerError::InvalidEvent { .. }
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns the HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) | ServerError::InvalidEvent { .. } => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Store(_) | ServerError::Internal(_) | ServerError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = if self.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}
