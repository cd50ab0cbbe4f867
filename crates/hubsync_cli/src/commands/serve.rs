//! Serve command implementation.

use super::open_store;
use hubsync_server::{HeartbeatServer, ServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Options of the serve command.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Seed file.
    pub seed: PathBuf,
    /// Journal file, in-memory store if absent.
    pub journal: Option<PathBuf>,
    /// Listen address.
    pub bind: SocketAddr,
    /// Maximum events per heartbeat.
    pub max_events: usize,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Whether the tenant header is mandatory.
    pub require_tenant: bool,
}

impl ServeOptions {
    /// Builds the server configuration.
    pub fn server_config(&self) -> ServerConfig {
        let config = ServerConfig::new(self.bind)
            .with_max_events_per_heartbeat(self.max_events)
            .with_request_timeout(Duration::from_secs(self.request_timeout));
        if self.require_tenant {
            config.with_required_tenant_scope()
        } else {
            config
        }
    }
}

/// Runs the serve command.
pub fn run(options: &ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(&options.seed, options.journal.as_deref())?;
    if options.journal.is_none() {
        tracing::warn!("no journal given, events are kept in memory only");
    }
    tracing::info!(events = store.event_count(), "store opened");

    let server = Arc::new(HeartbeatServer::new(options.server_config(), store));

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve())?;
    Ok(())
}
