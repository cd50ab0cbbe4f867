//! Main heartbeat server.

use crate::access_check::PointAccessChecker;
use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::http;
use crate::reconciler::{HeartbeatOutcome, HeartbeatReconciler};
use axum::Router;
use chrono::{DateTime, Utc};
use hubsync_protocol::{
    epoch, AccessCheckRequest, AccessCheckResponse, Envelope, HeartbeatRequest, HeartbeatResponse,
};
use hubsync_store::{AccessStore, ManagerId, TenantId};
use std::sync::Arc;
use tokio::net::TcpListener;

/// The heartbeat server.
///
/// Owns the access store and answers manager/hub heartbeats and point
/// access checks. The `handle_*` methods are synchronous and transport
/// independent; [`HeartbeatServer::router`] exposes them over HTTP.
///
/// # Example
///
/// ```
/// use hubsync_server::{HeartbeatServer, ServerConfig};
/// use hubsync_store::{AccessStore, Records};
/// use std::sync::Arc;
///
/// let store = Arc::new(AccessStore::in_memory(Records::new()));
/// let server = HeartbeatServer::new(ServerConfig::default(), store);
/// assert_eq!(server.event_count(), 0);
/// ```
pub struct HeartbeatServer {
    config: ServerConfig,
    store: Arc<AccessStore>,
    reconciler: HeartbeatReconciler,
    checker: PointAccessChecker,
}

impl HeartbeatServer {
    /// Creates a server using wall-clock time.
    pub fn new(config: ServerConfig, store: Arc<AccessStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Creates a server with the given time source.
    pub fn with_clock(config: ServerConfig, store: Arc<AccessStore>, clock: Arc<dyn Clock>) -> Self {
        let reconciler = HeartbeatReconciler::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.max_events_per_heartbeat,
        );
        let checker = PointAccessChecker::new(Arc::clone(&store), clock);

        Self {
            config,
            store,
            reconciler,
            checker,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the access store.
    pub fn store(&self) -> &Arc<AccessStore> {
        &self.store
    }

    /// Processes a heartbeat and reports what happened to its events.
    pub fn reconcile(
        &self,
        request: HeartbeatRequest,
        scope: Option<TenantId>,
    ) -> ServerResult<HeartbeatOutcome> {
        self.reconciler.reconcile(request.report, scope)
    }

    /// Handles a heartbeat request.
    pub fn handle_heartbeat(
        &self,
        request: HeartbeatRequest,
        scope: Option<TenantId>,
    ) -> ServerResult<HeartbeatResponse> {
        let envelope = request.envelope;
        let outcome = self.reconcile(request, scope)?;
        Ok(HeartbeatResponse::new(envelope, outcome.snapshot))
    }

    /// Handles an encoded heartbeat and returns the encoded response.
    pub fn handle_heartbeat_bytes(
        &self,
        envelope: Envelope,
        body: &[u8],
        scope: Option<TenantId>,
    ) -> ServerResult<Vec<u8>> {
        let request = HeartbeatRequest::decode(envelope, body)?;
        Ok(self.handle_heartbeat(request, scope)?.encode()?)
    }

    /// Handles a point access check.
    pub fn handle_access_check(
        &self,
        request: &AccessCheckRequest,
    ) -> ServerResult<AccessCheckResponse> {
        self.checker.check(request).map(AccessCheckResponse::new)
    }

    /// Handles an encoded access check and returns the encoded response.
    pub fn handle_access_check_bytes(&self, body: &[u8]) -> ServerResult<Vec<u8>> {
        let request = AccessCheckRequest::decode(body)?;
        Ok(self.handle_access_check(&request)?.encode()?)
    }

    /// Returns a manager's current watermark, the epoch when it has no events.
    pub fn watermark(&self, manager: ManagerId) -> DateTime<Utc> {
        self.store.watermark(manager).unwrap_or_else(epoch)
    }

    /// Returns the number of stored access events.
    pub fn event_count(&self) -> usize {
        self.store.event_count()
    }

    /// Builds the HTTP router for this server.
    pub fn router(self: Arc<Self>) -> Router {
        http::router(self)
    }

    /// Serves HTTP on the configured address until Ctrl-C.
    pub async fn serve(self: Arc<Self>) -> ServerResult<()> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "heartbeat server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(ServerError::Io)?;

        tracing::info!("heartbeat server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
