//! Error types for the heartbeat agent.

use hubsync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors that can occur during a heartbeat.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server does not know this manager or point.
    #[error("not found: {0}")]
    NotFound(String),

    /// The server rejected the heartbeat's events.
    #[error("heartbeat rejected: {0}")]
    Rejected(String),

    /// The server failed or timed out.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Response body.
        message: String,
    },

    /// Protocol error (invalid message format).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl From<ProtocolError> for AgentError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl AgentError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Maps a non-success HTTP status to an error.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let message = String::from_utf8_lossy(body).into_owned();
        match status {
            404 => Self::NotFound(message),
            400 => Self::Rejected(message),
            _ => Self::Server { status, message },
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Rejections and unknown managers fail identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Transport { retryable, .. } => *retryable,
            AgentError::Server { status, .. } => *status == 408 || *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(AgentError::transport_retryable("connection reset").is_retryable());
        assert!(!AgentError::Transport {
            message: "bad certificate".into(),
            retryable: false,
        }
        .is_retryable());
        assert!(AgentError::from_status(503, b"").is_retryable());
        assert!(AgentError::from_status(408, b"").is_retryable());
        assert!(!AgentError::from_status(400, b"bad").is_retryable());
        assert!(!AgentError::from_status(404, b"manager:7").is_retryable());
        assert!(!AgentError::NotConnected.is_retryable());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            AgentError::from_status(404, b"not found: manager:7"),
            AgentError::NotFound(m) if m.contains("manager:7")
        ));
        assert!(matches!(
            AgentError::from_status(400, b"invalid event"),
            AgentError::Rejected(_)
        ));
        assert!(matches!(
            AgentError::from_status(500, b"internal server error"),
            AgentError::Server { status: 500, .. }
        ));
    }
}
