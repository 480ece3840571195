//! Machine-readable error classification shared by every crate

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kind reported alongside human-readable messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Provider binary or package is missing
    ProviderUnavailable,
    /// Provider rejected credentials or billing
    ProviderAuth,
    /// A server refused the client's credentials
    Auth,
    /// Remote host could not be reached
    NetworkUnreachable,
    /// An operation exceeded its deadline
    Timeout,
    /// Remote side answered with a server failure
    ServerError,
    /// Caller supplied an invalid configuration value
    ConfigError,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ProviderUnavailable => "provider-unavailable",
            ErrorKind::ProviderAuth => "provider-auth",
            ErrorKind::Auth => "auth",
            ErrorKind::NetworkUnreachable => "network-unreachable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerError => "server-error",
            ErrorKind::ConfigError => "config-error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
