//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so devices can plug in
//! whatever stack their platform offers.

use crate::error::{AgentError, AgentResult};
use crate::transport::HeartbeatTransport;
use hubsync_protocol::{
    paths, AccessCheckRequest, AccessCheckResponse, HeartbeatRequest, HeartbeatResponse,
};
use parking_lot::RwLock;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a JSON POST request.
    ///
    /// `Err` means no response arrived at all (connection refused, reset,
    /// timed out locally).
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based heartbeat transport using JSON bodies.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the server (e.g., "https://cloud.example.com").
    base_url: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn post_json(&self, path: &str, body: Vec<u8>) -> AgentResult<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url, body).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            AgentError::transport_retryable(e)
        })?;

        if response.status == 200 {
            *self.last_error.write() = None;
            return Ok(response.body);
        }

        let error = AgentError::from_status(response.status, &response.body);
        *self.last_error.write() = Some(error.to_string());
        Err(error)
    }
}

impl<C: HttpClient> HeartbeatTransport for HttpTransport<C> {
    fn heartbeat(&self, request: &HeartbeatRequest) -> AgentResult<HeartbeatResponse> {
        let body = self.post_json(paths::heartbeat(request.envelope), request.encode()?)?;
        Ok(HeartbeatResponse::decode(request.envelope, &body)?)
    }

    fn check_access(&self, request: &AccessCheckRequest) -> AgentResult<AccessCheckResponse> {
        let body = self.post_json(paths::POINT_ACCESS, request.encode()?)?;
        Ok(AccessCheckResponse::decode(&body)?)
    }

    fn is_connected(&self) -> bool {
        self.client.is_healthy()
    }
}
