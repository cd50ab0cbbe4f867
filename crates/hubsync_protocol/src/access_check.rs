//! Point-level access check messages.
//!
//! Stand-alone points without a manager ask the server directly whether a
//! presented code opens them.

use crate::error::{ProtocolError, ProtocolResult};
use hubsync_store::Access;
use serde::{Deserialize, Serialize};

/// Access check request sent by a point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCheckRequest {
    /// Key identifying the point.
    pub key: String,
    /// Code presented at the point.
    pub code: String,
}

impl AccessCheckRequest {
    /// Creates a new request.
    pub fn new(key: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            code: code.into(),
        }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(ProtocolError::encode)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(ProtocolError::malformed)
    }
}

/// Access check verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessCheckResponse {
    /// Whether the point should open.
    pub access: Access,
}

impl AccessCheckResponse {
    /// Creates a new response.
    #[must_use]
    pub fn new(access: Access) -> Self {
        Self { access }
    }

    /// Encodes to JSON.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(ProtocolError::encode)
    }

    /// Decodes from JSON.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        serde_json::from_slice(bytes).map_err(ProtocolError::malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shape() {
        let request = AccessCheckRequest::decode(br#"{"key":"front","code":"1234"}"#).unwrap();
        assert_eq!(request, AccessCheckRequest::new("front", "1234"));
        assert!(AccessCheckRequest::decode(br#"{"key":"front"}"#).is_err());
    }

    #[test]
    fn response_wire_shape() {
        let bytes = AccessCheckResponse::new(Access::Deny).encode().unwrap();
        assert_eq!(bytes, br#"{"access":"deny"}"#.to_vec());
    }
}
