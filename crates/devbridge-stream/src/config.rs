//! Streaming client configuration

use std::time::Duration;
use url::Url;

/// Tunables for [`crate::SseConnectionManager`]
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Backoff multiplier per retry
    pub multiplier: f64,
    /// Upper bound for the backoff delay, before jitter
    pub max_delay: Duration,
    /// Jitter as a fraction of the delay (0.3 adds up to 30%)
    pub jitter_factor: f64,
    /// Retries scheduled before giving up
    pub max_retries: u32,
    /// Consecutive failures that count as a doom loop
    pub max_consecutive_failures: u32,
    /// Doom loop only if the failures happen within this window
    pub doom_loop_window: Duration,
    /// Pause after a doom loop; also the quiet period that resets the failure streak
    pub cooldown: Duration,
    /// Probe liveness while connected; without a health endpoint only a
    /// stream error reveals a dead connection
    pub heartbeat: bool,
    pub heartbeat_interval: Duration,
    /// Deadline for the heartbeat probe to acknowledge
    pub heartbeat_timeout: Duration,
    /// Check the health endpoint before opening the stream
    pub health_check: bool,
    pub health_check_timeout: Duration,
    /// Health endpoint; defaults to the `health` sibling of the event URL
    pub health_url: Option<Url>,
    /// Deadline for the stream to return response headers
    pub open_timeout: Duration,
    /// Never surface errors to the application
    pub silent: bool,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.3,
            max_retries: 10,
            max_consecutive_failures: 5,
            doom_loop_window: Duration::from_secs(30),
            cooldown: Duration::from_secs(60),
            heartbeat: true,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(10),
            health_check: true,
            health_check_timeout: Duration::from_secs(5),
            health_url: None,
            open_timeout: Duration::from_secs(15),
            silent: false,
        }
    }
}
