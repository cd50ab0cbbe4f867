//! Point-level access checks for stand-alone points.

use crate::clock::Clock;
use crate::error::{ServerError, ServerResult};
use hubsync_protocol::AccessCheckRequest;
use hubsync_store::{Access, AccessCheckPolicy, AccessPoint, AccessStore};
use std::sync::Arc;

/// Decides a presented code against a point's cached configuration.
///
/// A point without configuration or without a cached code denies.
pub fn decide(point: &AccessPoint, code: &str) -> Access {
    match &point.config {
        Some(config) => match (config.policy, config.code.as_deref()) {
            (AccessCheckPolicy::MatchCode, Some(cached)) if cached == code => Access::Grant,
            _ => Access::Deny,
        },
        None => Access::Deny,
    }
}

/// Answers access checks and records the point's check-in.
///
/// Checks never create access events; those come only from heartbeats.
pub struct PointAccessChecker {
    store: Arc<AccessStore>,
    clock: Arc<dyn Clock>,
}

impl PointAccessChecker {
    /// Creates a checker.
    pub fn new(store: Arc<AccessStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Checks a presented code.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] if no point has the key.
    pub fn check(&self, request: &AccessCheckRequest) -> ServerResult<Access> {
        let now = self.clock.now();
        let mut tx = self.store.begin_write();

        let point = tx
            .records()
            .point_by_key(&request.key)
            .ok_or_else(|| ServerError::NotFound(format!("point key {:?}", request.key)))?;
        let (point_id, access) = (point.id, decide(point, &request.code));

        tx.touch_point(point_id, now)?;
        drop(tx.commit()?);

        tracing::debug!(point = %point_id, %access, "access check");
        Ok(access)
    }
}
