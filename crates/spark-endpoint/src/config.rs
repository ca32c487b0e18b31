//! `EndpointConfig` — construction-time tunables for the retry timer backoff.
use std::time::Duration;

/// Construction-time tunables. Fixed for the life of an `Endpoint`; there is
/// no hot-reload layer here (§1 non-goal: no automatic reconnection, nothing
/// to reconfigure mid-flight).
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    /// Floor used when a filter's `RetryAfter` requests a shorter interval
    /// than the host is willing to schedule timers at.
    pub min_retry: Duration,
    /// Ceiling clamp for the same.
    pub max_retry: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            min_retry: Duration::from_millis(5),
            max_retry: Duration::from_secs(30),
        }
    }
}

impl EndpointConfig {
    pub fn clamp_retry(&self, requested: Duration) -> Duration {
        requested.clamp(self.min_retry, self.max_retry)
    }
}
