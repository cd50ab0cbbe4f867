//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the heartbeat server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Maximum number of events accepted in one heartbeat.
    pub max_events_per_heartbeat: usize,
    /// Whether requests must carry the tenant scope header.
    pub require_tenant_scope: bool,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            request_timeout: Duration::from_secs(30),
            max_events_per_heartbeat: 500,
            require_tenant_scope: false,
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the maximum number of events per heartbeat.
    pub fn with_max_events_per_heartbeat(mut self, max: usize) -> Self {
        self.max_events_per_heartbeat = max;
        self
    }

    /// Requires the tenant scope header on every request.
    pub fn with_required_tenant_scope(mut self) -> Self {
        self.require_tenant_scope = true;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}
