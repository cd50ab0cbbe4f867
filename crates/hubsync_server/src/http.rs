//! HTTP surface.
//!
//! Bodies are passed to the server as raw bytes so that schema errors are
//! reported by the protocol decoder as 400s with a description, instead of
//! axum's extractor rejections.

use crate::error::{ServerError, ServerResult};
use crate::server::HeartbeatServer;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use hubsync_protocol::{paths, Envelope};
use hubsync_store::TenantId;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Header carrying the tenant scope set by the upstream auth layer.
pub const TENANT_HEADER: &str = "x-tenant-id";

type SharedServer = Arc<HeartbeatServer>;

/// Builds the router serving all protocol endpoints.
pub fn router(server: SharedServer) -> Router {
    let timeout = server.config().request_timeout;

    Router::new()
        .route(paths::MANAGER_HEARTBEAT, post(manager_heartbeat))
        .route(paths::HUB_HEARTBEAT, post(hub_heartbeat))
        .route(paths::POINT_ACCESS, post(point_access))
        .route(paths::HEALTH, get(health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(server)
}

/// Reads the tenant scope header.
fn tenant_scope(headers: &HeaderMap, required: bool) -> ServerResult<Option<TenantId>> {
    let Some(value) = headers.get(TENANT_HEADER) else {
        if required {
            return Err(ServerError::InvalidRequest(format!(
                "missing {TENANT_HEADER} header"
            )));
        }
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map(|id| Some(TenantId::new(id)))
        .ok_or_else(|| ServerError::InvalidRequest(format!("malformed {TENANT_HEADER} header")))
}

fn json(body: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Runs blocking store work off the async executor.
async fn blocking<T, F>(work: F) -> ServerResult<T>
where
    F: FnOnce() -> ServerResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ServerError::Internal(format!("request task failed: {err}")))?
}

async fn heartbeat(
    server: SharedServer,
    envelope: Envelope,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    let scope = tenant_scope(&headers, server.config().require_tenant_scope)?;
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("heartbeat", %request_id, envelope = envelope.key());

    let encoded = blocking(move || {
        let _enter = span.enter();
        server.handle_heartbeat_bytes(envelope, &body, scope)
    })
    .await?;
    Ok(json(encoded))
}

async fn manager_heartbeat(
    State(server): State<SharedServer>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    heartbeat(server, Envelope::Manager, headers, body).await
}

async fn hub_heartbeat(
    State(server): State<SharedServer>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    heartbeat(server, Envelope::Hub, headers, body).await
}

async fn point_access(State(server): State<SharedServer>, body: Bytes) -> ServerResult<Response> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("access_check", %request_id);

    let encoded = blocking(move || {
        let _enter = span.enter();
        server.handle_access_check_bytes(&body)
    })
    .await?;
    Ok(json(encoded))
}

async fn health() -> &'static str {
    "ok"
}
