//! Transport layer abstraction for heartbeats.

use crate::error::{AgentError, AgentResult};
use hubsync_protocol::{
    AccessCheckRequest, AccessCheckResponse, HeartbeatRequest, HeartbeatResponse,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A heartbeat transport handles communication with the hubsync server.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mock for testing).
pub trait HeartbeatTransport: Send + Sync {
    /// Sends a heartbeat and returns the server's snapshot.
    fn heartbeat(&self, request: &HeartbeatRequest) -> AgentResult<HeartbeatResponse>;

    /// Asks the server whether a stand-alone point may open.
    fn check_access(&self, request: &AccessCheckRequest) -> AgentResult<AccessCheckResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// A mock transport for testing.
///
/// Responses are scripted in order; every heartbeat request is recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    heartbeats: Mutex<VecDeque<AgentResult<HeartbeatResponse>>>,
    access: Mutex<VecDeque<AgentResult<AccessCheckResponse>>>,
    requests: Mutex<Vec<HeartbeatRequest>>,
}

impl MockTransport {
    /// Creates a new, connected mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Queues the result of the next unanswered heartbeat.
    pub fn push_heartbeat(&self, result: AgentResult<HeartbeatResponse>) {
        self.heartbeats.lock().push_back(result);
    }

    /// Queues the result of the next unanswered access check.
    pub fn push_access(&self, result: AgentResult<AccessCheckResponse>) {
        self.access.lock().push_back(result);
    }

    /// Returns the heartbeat requests sent so far.
    pub fn requests(&self) -> Vec<HeartbeatRequest> {
        self.requests.lock().clone()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl HeartbeatTransport for MockTransport {
    fn heartbeat(&self, request: &HeartbeatRequest) -> AgentResult<HeartbeatResponse> {
        if !self.is_connected() {
            return Err(AgentError::NotConnected);
        }
        self.requests.lock().push(request.clone());
        self.heartbeats
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::transport_retryable("no scripted response")))
    }

    fn check_access(&self, _request: &AccessCheckRequest) -> AgentResult<AccessCheckResponse> {
        if !self.is_connected() {
            return Err(AgentError::NotConnected);
        }
        self.access
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::transport_retryable("no scripted response")))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use hubsync_protocol::{Envelope, HeartbeatReport, ManagerSnapshot};
    use hubsync_store::{Access, ManagerId};

    fn request() -> HeartbeatRequest {
        HeartbeatRequest::new(Envelope::Manager, HeartbeatReport::new(ManagerId::new(7), None))
    }

    fn response() -> HeartbeatResponse {
        HeartbeatResponse::new(
            Envelope::Manager,
            ManagerSnapshot {
                id: ManagerId::new(7),
                cloud_last_access_event_at: Utc.timestamp_opt(0, 0).unwrap(),
                access_users: Vec::new(),
            },
        )
    }

    #[test]
    fn mock_transport_answers_in_order() {
        let transport = MockTransport::new();
        transport.push_heartbeat(Ok(response()));
        transport.push_heartbeat(Err(AgentError::from_status(503, b"")));

        assert!(transport.heartbeat(&request()).is_ok());
        assert!(transport.heartbeat(&request()).unwrap_err().is_retryable());
        assert!(transport.heartbeat(&request()).is_err());
        assert_eq!(transport.requests().len(), 3);
    }

    #[test]
    fn mock_transport_disconnected() {
        let transport = MockTransport::new();
        transport.push_heartbeat(Ok(response()));
        transport.set_connected(false);

        assert!(matches!(
            transport.heartbeat(&request()),
            Err(AgentError::NotConnected)
        ));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn mock_transport_access_check() {
        let transport = MockTransport::new();
        transport.push_access(Ok(AccessCheckResponse::new(Access::Grant)));

        let response = transport
            .check_access(&AccessCheckRequest::new("front-door", "2468"))
            .unwrap();
        assert_eq!(response.access, Access::Grant);
    }
}
