//! Streaming client errors

use devbridge_proto::ErrorKind;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::classify;

#[derive(Debug, Error)]
pub enum SseError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Server answered {status}")]
    Status { status: u16 },

    #[error("Server reported unhealthy{}", version_suffix(.version))]
    Unhealthy { version: Option<String> },

    #[error("Unexpected health response: {0}")]
    InvalidHealth(String),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    #[error("Event stream ended")]
    StreamEnded,

    #[error("Connection manager is not running")]
    Closed,
}

fn version_suffix(version: &Option<String>) -> String {
    version
        .as_deref()
        .map(|v| format!(" (version {})", v))
        .unwrap_or_default()
}

impl SseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SseError::InvalidUrl { .. } => ErrorKind::ConfigError,
            SseError::Request(e) => classify::reqwest_error(e),
            SseError::Status { status } => classify::status(*status),
            SseError::Unhealthy { .. } => ErrorKind::ServerError,
            SseError::Timeout { .. } => ErrorKind::Timeout,
            SseError::StreamEnded => ErrorKind::NetworkUnreachable,
            SseError::InvalidHealth(_) | SseError::Closed => ErrorKind::Unknown,
        }
    }
}

/// Classified, cloneable record of one failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl ConnectionFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&SseError> for ConnectionFailure {
    fn from(error: &SseError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl From<SseError> for ConnectionFailure {
    fn from(error: SseError) -> Self {
        Self::from(&error)
    }
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// Why an error was handed to the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The health pre-check of a user-initiated connect failed
    HealthCheck,
    /// Every scheduled retry failed
    RetriesExhausted,
    /// Too many fast failures; one retry is scheduled after the cooldown
    DoomLoop,
}

impl FailureReason {
    pub fn describe(&self) -> &'static str {
        match self {
            FailureReason::HealthCheck => "Server health check failed",
            FailureReason::RetriesExhausted => "Giving up after repeated connection failures",
            FailureReason::DoomLoop => "Connection keeps failing, pausing before the next attempt",
        }
    }
}

/// Error surfaced to the application
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {last}", .reason.describe())]
pub struct SurfacedError {
    pub reason: FailureReason,
    pub last: ConnectionFailure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_kinds() {
        assert_eq!(SseError::Status { status: 401 }.kind(), ErrorKind::Auth);
        assert_eq!(SseError::Status { status: 503 }.kind(), ErrorKind::ServerError);
        assert_eq!(
            SseError::Timeout {
                what: "Health check",
                after: Duration::from_secs(5)
            }
            .kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn test_surfaced_message() {
        let err = SurfacedError {
            reason: FailureReason::RetriesExhausted,
            last: ConnectionFailure::new(ErrorKind::ServerError, "Server answered 502"),
        };
        assert_eq!(
            err.to_string(),
            "Giving up after repeated connection failures: Server answered 502 (server-error)"
        );
    }

    #[test]
    fn test_unhealthy_message() {
        let err = SseError::Unhealthy {
            version: Some("1.2.0".to_string()),
        };
        assert_eq!(err.to_string(), "Server reported unhealthy (version 1.2.0)");
        assert_eq!(
            SseError::Unhealthy { version: None }.to_string(),
            "Server reported unhealthy"
        );
    }
}
