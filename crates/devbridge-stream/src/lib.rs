//! Resilient server-sent events client
//!
//! Keeps one event stream open against a development server: health
//! pre-check, heartbeat, exponential backoff with jitter, and a cooldown
//! that stops rapid reconnect loops. The state machine in [`state`] is
//! pure; [`SseConnectionManager`] drives it.

pub mod backoff;
pub mod classify;
pub mod config;
pub mod error;
pub mod health;
pub mod manager;
pub mod sse;
pub mod state;

pub use backoff::Backoff;
pub use config::SseConfig;
pub use error::{ConnectionFailure, FailureReason, SseError, SurfacedError};
pub use health::{check_health, health_url, HealthStatus};
pub use manager::{HealthHeartbeat, HeartbeatProbe, SseChannels, SseConnectionManager};
pub use sse::{SseDecoder, SseEvent};
pub use state::{ConnectionState, RetryState};
