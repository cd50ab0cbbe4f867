//! The device-side heartbeat cycle.

use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};
use crate::transport::HeartbeatTransport;
use chrono::{DateTime, Utc};
use hubsync_protocol::{
    epoch, CredentialEntry, HeartbeatReport, HeartbeatRequest, ReportedEvent,
};
use hubsync_store::{Access, AccessPointId};
use parking_lot::{Mutex, RwLock};

/// Statistics about heartbeats.
#[derive(Debug, Clone, Default)]
pub struct AgentStats {
    /// Heartbeats answered with a snapshot.
    pub heartbeats_completed: u64,
    /// Events the server admitted.
    pub events_acknowledged: u64,
    /// Events discarded: stale heartbeats, or recorded at or before the
    /// watermark.
    pub events_dropped: u64,
    /// Events flushed after the server rejected their batch.
    pub events_rejected: u64,
    /// Total number of retries.
    pub retries: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one heartbeat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatCycleResult {
    /// Events sent.
    pub sent: usize,
    /// Events the server admitted.
    pub acknowledged: usize,
    /// Events the server discarded as stale.
    pub dropped: usize,
    /// Watermark returned by the server.
    pub watermark: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct BufferedEvent {
    seq: u64,
    event: ReportedEvent,
}

#[derive(Debug, Default)]
struct AgentState {
    watermark: Option<DateTime<Utc>>,
    /// Sorted by `at`, then by recording order.
    buffer: Vec<BufferedEvent>,
    credentials: Vec<CredentialEntry>,
    next_seq: u64,
}

/// Buffers access events on the device and reconciles them with the server.
///
/// Between heartbeats the agent decides access offline from the last
/// credential snapshot it received.
pub struct HeartbeatAgent<T: HeartbeatTransport> {
    config: AgentConfig,
    transport: T,
    state: Mutex<AgentState>,
    stats: RwLock<AgentStats>,
    /// Held for a whole heartbeat so two cycles never send the same events.
    cycle: Mutex<()>,
}

impl<T: HeartbeatTransport> HeartbeatAgent<T> {
    /// Creates an agent with no watermark and an empty buffer.
    pub fn new(config: AgentConfig, transport: T) -> Self {
        Self {
            config,
            transport,
            state: Mutex::new(AgentState::default()),
            stats: RwLock::new(AgentStats::default()),
            cycle: Mutex::new(()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the current watermark.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.state.lock().watermark
    }

    /// Returns the cached credentials.
    pub fn credentials(&self) -> Vec<CredentialEntry> {
        self.state.lock().credentials.clone()
    }

    /// Returns the buffered events, oldest first.
    pub fn buffered(&self) -> Vec<ReportedEvent> {
        self.state
            .lock()
            .buffer
            .iter()
            .map(|buffered| buffered.event.clone())
            .collect()
    }

    /// Returns the statistics.
    pub fn stats(&self) -> AgentStats {
        self.stats.read().clone()
    }

    /// Buffers a locally observed event.
    ///
    /// Returns false if the event is at or before the watermark; the server
    /// would reject any batch containing it, so it is dropped instead.
    pub fn record_event(&self, event: ReportedEvent) -> bool {
        let mut state = self.state.lock();
        if state.watermark.is_some_and(|watermark| event.at <= watermark) {
            drop(state);
            tracing::warn!(at = %event.at, "dropping event at or before the watermark");
            self.stats.write().events_dropped += 1;
            return false;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let index = state.buffer.partition_point(|buffered| buffered.event.at <= event.at);
        state.buffer.insert(index, BufferedEvent { seq, event });
        true
    }

    /// Decides offline whether `code` opens `point` at `now`, and buffers
    /// the attempt.
    pub fn check_access(&self, point: AccessPointId, code: &str, now: DateTime<Utc>) -> Access {
        let user = self
            .state
            .lock()
            .credentials
            .iter()
            .find(|credential| credential.code == code && credential.opens_at(point, now))
            .map(|credential| credential.id);

        let (access, event) = match user {
            Some(user) => (Access::Grant, ReportedEvent::grant(now, point, user, code)),
            None => (Access::Deny, ReportedEvent::deny(now, point, code)),
        };
        tracing::debug!(%point, ?access, "offline access decision");
        self.record_event(event);
        access
    }

    /// Runs one heartbeat: sends the oldest buffered events with the
    /// current watermark and applies the server's snapshot.
    pub fn heartbeat(&self) -> AgentResult<HeartbeatCycleResult> {
        let _cycle = self.cycle.lock();

        let (submitted, sent) = {
            let state = self.state.lock();
            (state.watermark, self.next_batch(&state.buffer))
        };
        let events: Vec<ReportedEvent> = sent.iter().map(|b| b.event.clone()).collect();
        let request = HeartbeatRequest::new(
            self.config.envelope,
            HeartbeatReport::new(self.config.manager_id, submitted).with_events(events),
        );

        tracing::debug!(
            manager = %self.config.manager_id,
            events = sent.len(),
            "sending heartbeat"
        );

        let response = match self.transport.heartbeat(&request) {
            Ok(response) => response,
            Err(err) => {
                if matches!(err, AgentError::Rejected(_)) {
                    tracing::warn!(
                        manager = %self.config.manager_id,
                        events = sent.len(),
                        error = %err,
                        "heartbeat rejected, flushing sent events"
                    );
                    self.remove_sent(&sent);
                    self.stats.write().events_rejected += sent.len() as u64;
                }
                self.stats.write().last_error = Some(err.to_string());
                return Err(err);
            }
        };

        // An admitted batch moves the watermark to exactly its latest `at`;
        // any other reply carries a watermark written by someone else.
        let watermark = response.snapshot.cloud_last_access_event_at;
        let latest_sent = sent.iter().map(|b| b.event.at).max();
        let acknowledged = latest_sent == Some(watermark)
            && watermark > submitted.unwrap_or_else(epoch);

        {
            let mut state = self.state.lock();
            state.buffer.retain(|b| !sent.iter().any(|s| s.seq == b.seq));
            state.watermark = Some(watermark);
            state.credentials = response.snapshot.access_users;
        }

        let result = HeartbeatCycleResult {
            sent: sent.len(),
            acknowledged: if acknowledged { sent.len() } else { 0 },
            dropped: if acknowledged { 0 } else { sent.len() },
            watermark,
        };

        if result.dropped > 0 {
            tracing::warn!(
                manager = %self.config.manager_id,
                dropped = result.dropped,
                %watermark,
                "server discarded stale heartbeat"
            );
        }

        let mut stats = self.stats.write();
        stats.heartbeats_completed += 1;
        stats.events_acknowledged += result.acknowledged as u64;
        stats.events_dropped += result.dropped as u64;
        stats.last_error = None;

        Ok(result)
    }

    /// Runs a heartbeat, retrying retryable failures with backoff.
    pub fn heartbeat_with_retry(&self) -> AgentResult<HeartbeatCycleResult> {
        let retry_config = &self.config.retry;
        let mut last_error = None;

        for attempt in 0..retry_config.max_attempts {
            if attempt > 0 {
                std::thread::sleep(retry_config.delay_for_attempt(attempt));
                self.stats.write().retries += 1;
            }

            match self.heartbeat() {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < retry_config.max_attempts {
                        tracing::debug!(attempt, error = %e, "retrying heartbeat");
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AgentError::Protocol("no heartbeat attempts made".into())))
    }

    /// Picks the oldest events that fit into one heartbeat.
    ///
    /// A batch never splits events sharing an `at`: once the first part is
    /// admitted, the rest would no longer be after the watermark.
    fn next_batch(&self, buffer: &[BufferedEvent]) -> Vec<BufferedEvent> {
        let max = self.config.max_events_per_heartbeat;
        if buffer.len() <= max {
            return buffer.to_vec();
        }

        let boundary = buffer[max].event.at;
        let mut end = max;
        while end > 0 && buffer[end - 1].event.at == boundary {
            end -= 1;
        }
        if end == 0 {
            // Every candidate shares one timestamp; send them together.
            end = buffer.partition_point(|b| b.event.at <= boundary);
        }
        buffer[..end].to_vec()
    }

    fn remove_sent(&self, sent: &[BufferedEvent]) {
        self.state
            .lock()
            .buffer
            .retain(|b| !sent.iter().any(|s| s.seq == b.seq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::transport::MockTransport;
    use chrono::{Duration, TimeZone};
    use hubsync_protocol::{Envelope, HeartbeatResponse, ManagerSnapshot, PointRef};
    use hubsync_store::{AccessUserId, ManagerId};

    const MANAGER: ManagerId = ManagerId::new(7);
    const DOOR: AccessPointId = AccessPointId::new(9);
    const ADA: AccessUserId = AccessUserId::new(5);

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn snapshot(watermark: DateTime<Utc>, access_users: Vec<CredentialEntry>) -> HeartbeatResponse {
        HeartbeatResponse::new(
            Envelope::Manager,
            ManagerSnapshot {
                id: MANAGER,
                cloud_last_access_event_at: watermark,
                access_users,
            },
        )
    }

    fn ada(expire_code_at: Option<DateTime<Utc>>) -> CredentialEntry {
        CredentialEntry {
            id: ADA,
            name: "Ada".into(),
            code: "123".into(),
            activate_code_at: None,
            expire_code_at,
            access_points: vec![PointRef {
                id: DOOR,
                name: "Front door".into(),
            }],
        }
    }

    fn agent() -> HeartbeatAgent<MockTransport> {
        HeartbeatAgent::new(
            AgentConfig::new(MANAGER).with_retry(RetryConfig::no_retry()),
            MockTransport::new(),
        )
    }

    #[test]
    fn buffer_is_ordered_by_time() {
        let agent = agent();
        agent.record_event(ReportedEvent::deny(at(3), DOOR, "1"));
        agent.record_event(ReportedEvent::deny(at(1), DOOR, "2"));
        agent.record_event(ReportedEvent::deny(at(3), DOOR, "3"));

        let codes: Vec<String> = agent.buffered().into_iter().map(|e| e.code).collect();
        assert_eq!(codes, ["2", "1", "3"]);
    }

    #[test]
    fn acknowledged_heartbeat_advances_watermark() {
        let agent = agent();
        agent.record_event(ReportedEvent::deny(at(1), DOOR, "1"));
        agent.record_event(ReportedEvent::deny(at(2), DOOR, "2"));
        agent
            .transport()
            .push_heartbeat(Ok(snapshot(at(2), vec![ada(None)])));

        let result = agent.heartbeat().unwrap();

        assert_eq!(result.sent, 2);
        assert_eq!(result.acknowledged, 2);
        assert_eq!(result.dropped, 0);
        assert_eq!(agent.watermark(), Some(at(2)));
        assert!(agent.buffered().is_empty());
        assert_eq!(agent.credentials().len(), 1);

        let requests = agent.transport().requests();
        assert_eq!(requests[0].report.cloud_last_access_event_at, None);
        assert_eq!(requests[0].report.access_events.len(), 2);
    }

    #[test]
    fn stale_reply_drops_sent_events() {
        let agent = agent();
        agent.transport().push_heartbeat(Ok(snapshot(at(10), Vec::new())));
        agent.heartbeat().unwrap();

        agent.record_event(ReportedEvent::deny(at(20), DOOR, "1"));
        // Another writer moved the server to at(15); our batch is discarded.
        agent.transport().push_heartbeat(Ok(snapshot(at(15), Vec::new())));

        let result = agent.heartbeat().unwrap();

        assert_eq!(result.dropped, 1);
        assert_eq!(result.acknowledged, 0);
        assert_eq!(agent.watermark(), Some(at(15)));
        assert!(agent.buffered().is_empty());
        assert_eq!(agent.stats().events_dropped, 1);
    }

    #[test]
    fn reply_past_the_sent_events_is_not_an_acknowledgement() {
        let agent = agent();
        agent.transport().push_heartbeat(Ok(snapshot(at(10), Vec::new())));
        agent.heartbeat().unwrap();

        agent.record_event(ReportedEvent::deny(at(12), DOOR, "1"));
        // The server had already moved to at(15) through another writer.
        agent.transport().push_heartbeat(Ok(snapshot(at(15), Vec::new())));

        let result = agent.heartbeat().unwrap();

        assert_eq!(result.acknowledged, 0);
        assert_eq!(result.dropped, 1);
        assert_eq!(agent.stats().events_acknowledged, 0);
        assert_eq!(agent.stats().events_dropped, 1);
    }

    #[test]
    fn first_heartbeat_against_advanced_server_drops_events() {
        let agent = agent();
        agent.record_event(ReportedEvent::deny(at(3), DOOR, "1"));
        agent.transport().push_heartbeat(Ok(snapshot(at(8), Vec::new())));

        let result = agent.heartbeat().unwrap();

        assert_eq!(result.dropped, 1);
        assert_eq!(agent.watermark(), Some(at(8)));
    }

    #[test]
    fn rejected_batch_is_flushed() {
        let agent = agent();
        agent.record_event(ReportedEvent::deny(at(1), DOOR, "1"));
        agent
            .transport()
            .push_heartbeat(Err(AgentError::from_status(400, b"event 0: bad")));

        assert!(matches!(agent.heartbeat(), Err(AgentError::Rejected(_))));
        assert!(agent.buffered().is_empty());
        assert_eq!(agent.watermark(), None);
        assert_eq!(agent.stats().events_rejected, 1);
    }

    #[test]
    fn failed_heartbeat_keeps_buffer() {
        let agent = agent();
        agent.record_event(ReportedEvent::deny(at(1), DOOR, "1"));
        agent
            .transport()
            .push_heartbeat(Err(AgentError::transport_retryable("connection reset")));

        assert!(agent.heartbeat().is_err());
        assert_eq!(agent.buffered().len(), 1);
        assert!(agent.stats().last_error.unwrap().contains("connection reset"));
    }

    #[test]
    fn events_recorded_during_heartbeat_stay_buffered() {
        let agent = agent();
        agent.record_event(ReportedEvent::deny(at(1), DOOR, "1"));
        agent.transport().push_heartbeat(Ok(snapshot(at(1), Vec::new())));
        agent.heartbeat().unwrap();

        agent.record_event(ReportedEvent::deny(at(5), DOOR, "2"));
        assert_eq!(agent.buffered().len(), 1);
    }

    #[test]
    fn events_before_watermark_are_dropped_on_record() {
        let agent = agent();
        agent.transport().push_heartbeat(Ok(snapshot(at(10), Vec::new())));
        agent.heartbeat().unwrap();

        assert!(!agent.record_event(ReportedEvent::deny(at(10), DOOR, "1")));
        assert!(agent.record_event(ReportedEvent::deny(at(11), DOOR, "1")));
        assert_eq!(agent.buffered().len(), 1);
        assert_eq!(agent.stats().events_dropped, 1);
    }

    #[test]
    fn batches_do_not_split_equal_timestamps() {
        let agent = HeartbeatAgent::new(
            AgentConfig::new(MANAGER).with_max_events_per_heartbeat(2),
            MockTransport::new(),
        );
        agent.record_event(ReportedEvent::deny(at(1), DOOR, "1"));
        agent.record_event(ReportedEvent::deny(at(2), DOOR, "2"));
        agent.record_event(ReportedEvent::deny(at(2), DOOR, "3"));
        agent.transport().push_heartbeat(Ok(snapshot(at(1), Vec::new())));

        let result = agent.heartbeat().unwrap();

        assert_eq!(result.sent, 1);
        assert_eq!(result.acknowledged, 1);
        assert_eq!(agent.buffered().len(), 2);
    }

    #[test]
    fn offline_access_uses_cached_credentials() {
        let agent = agent();
        agent
            .transport()
            .push_heartbeat(Ok(snapshot(at(0), vec![ada(Some(at(100)))])));
        agent.heartbeat().unwrap();

        assert_eq!(agent.check_access(DOOR, "123", at(50)), Access::Grant);
        assert_eq!(agent.check_access(DOOR, "999", at(51)), Access::Deny);
        assert_eq!(agent.check_access(DOOR, "123", at(100)), Access::Deny);
        assert_eq!(
            agent.check_access(AccessPointId::new(10), "123", at(101)),
            Access::Deny
        );

        let buffered = agent.buffered();
        assert_eq!(buffered.len(), 4);
        assert_eq!(buffered[0].access_user_id, Some(ADA));
        assert!(buffered[1..].iter().all(|e| e.access_user_id.is_none()));
    }

    #[test]
    fn retry_stops_on_success() {
        let agent = HeartbeatAgent::new(
            AgentConfig::new(MANAGER).with_retry(
                RetryConfig::new(3)
                    .with_initial_delay(std::time::Duration::from_millis(1))
                    .without_jitter(),
            ),
            MockTransport::new(),
        );
        agent
            .transport()
            .push_heartbeat(Err(AgentError::from_status(503, b"")));
        agent.transport().push_heartbeat(Ok(snapshot(at(0), Vec::new())));

        assert!(agent.heartbeat_with_retry().is_ok());
        assert_eq!(agent.stats().retries, 1);
    }

    #[test]
    fn retry_gives_up_on_permanent_errors() {
        let agent = HeartbeatAgent::new(
            AgentConfig::new(MANAGER).with_retry(RetryConfig::new(3).without_jitter()),
            MockTransport::new(),
        );
        agent
            .transport()
            .push_heartbeat(Err(AgentError::from_status(404, b"manager:7")));

        assert!(matches!(
            agent.heartbeat_with_retry(),
            Err(AgentError::NotFound(_))
        ));
        assert_eq!(agent.stats().retries, 0);
        assert_eq!(agent.transport().requests().len(), 1);
    }
}
