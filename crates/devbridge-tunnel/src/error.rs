//! Tunnel errors

use devbridge_proto::{ErrorKind, ProviderKind};
use std::time::Duration;
use thiserror::Error;

/// Why a single provider attempt failed
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider: ProviderKind,
    pub kind: ErrorKind,
    pub message: String,
}

fn format_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  • {}: {}", f.provider, f.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Invalid port {0}: must be a positive integer between 1 and 65535")]
    InvalidPort(i64),

    #[error("{provider} is not available: {reason}")]
    Unavailable {
        provider: ProviderKind,
        reason: String,
    },

    #[error("{provider} rejected its credentials: {reason}\n{remediation}")]
    Auth {
        provider: ProviderKind,
        reason: String,
        remediation: &'static str,
    },

    #[error("{provider} did not report a public URL within {after:?}")]
    Timeout {
        provider: ProviderKind,
        after: Duration,
    },

    #[error("{provider} exited before reporting a public URL ({status})")]
    ExitedEarly {
        provider: ProviderKind,
        status: String,
    },

    #[error("Failed to launch {provider}: {source}")]
    Spawn {
        provider: ProviderKind,
        #[source]
        source: std::io::Error,
    },

    #[error("{provider} failed: {message}")]
    Provider {
        provider: ProviderKind,
        message: String,
    },

    #[error("No tunnel providers configured")]
    NoProviders,

    #[error("All tunnel providers failed:\n{}", format_failures(.0))]
    AllProvidersFailed(Vec<ProviderFailure>),
}

impl TunnelError {
    /// Machine-readable classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            TunnelError::InvalidPort(_) | TunnelError::NoProviders => ErrorKind::ConfigError,
            TunnelError::Unavailable { .. } => ErrorKind::ProviderUnavailable,
            TunnelError::Auth { .. } => ErrorKind::ProviderAuth,
            TunnelError::Timeout { .. } => ErrorKind::Timeout,
            TunnelError::Spawn { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                ErrorKind::ProviderUnavailable
            }
            TunnelError::ExitedEarly { .. }
            | TunnelError::Spawn { .. }
            | TunnelError::Provider { .. }
            | TunnelError::AllProvidersFailed(_) => ErrorKind::Unknown,
        }
    }

    /// Per-provider failures when every provider was exhausted
    pub fn failures(&self) -> &[ProviderFailure] {
        match self {
            TunnelError::AllProvidersFailed(failures) => failures,
            _ => &[],
        }
    }
}
