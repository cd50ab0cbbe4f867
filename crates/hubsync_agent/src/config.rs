//! Configuration for the heartbeat agent.

use hubsync_protocol::Envelope;
use hubsync_store::ManagerId;
use std::time::{Duration, SystemTime};

/// Configuration for a device's heartbeat cycle.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Manager or hub this device reports as.
    pub manager_id: ManagerId,
    /// Envelope the device reports under.
    pub envelope: Envelope,
    /// Maximum number of buffered events sent per heartbeat.
    pub max_events_per_heartbeat: usize,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl AgentConfig {
    /// Creates a configuration for a manager.
    pub fn new(manager_id: ManagerId) -> Self {
        Self {
            manager_id,
            envelope: Envelope::Manager,
            max_events_per_heartbeat: 100,
            retry: RetryConfig::default(),
        }
    }

    /// Reports as a hub instead of a manager.
    pub fn as_hub(mut self) -> Self {
        self.envelope = Envelope::Hub;
        self
    }

    /// Sets the maximum number of events per heartbeat.
    pub fn with_max_events_per_heartbeat(mut self, max: usize) -> Self {
        self.max_events_per_heartbeat = max;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay before an attempt (0-indexed).
    ///
    /// Many devices of one site tend to fail together when the uplink drops;
    /// jitter of up to 25% spreads their retries.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let delay = base.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            Duration::from_secs_f64(delay + delay * 0.25 * jitter_fraction())
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Returns a value in `[0, 1)` derived from the clock's sub-second part.
fn jitter_fraction() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}
