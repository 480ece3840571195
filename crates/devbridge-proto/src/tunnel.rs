//! Tunnel descriptors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Third-party tunneling service backing a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ngrok,
    Cloudflared,
    Localtunnel,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ngrok => "ngrok",
            ProviderKind::Cloudflared => "cloudflared",
            ProviderKind::Localtunnel => "localtunnel",
        }
    }

    /// Parse a provider name as given on the command line
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ngrok" => Some(ProviderKind::Ngrok),
            "cloudflared" | "cloudflare" => Some(ProviderKind::Cloudflared),
            "localtunnel" | "lt" => Some(ProviderKind::Localtunnel),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single active tunnel of a bridge.
///
/// Replaced wholesale when the provider changes, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct TunnelInfo {
    /// Public URL assigned by the provider
    pub url: String,
    /// Identifier of this tunnel
    pub tunnel_id: String,
    /// Local port being exposed
    pub port: u16,
    /// Provider that created the tunnel
    pub provider: ProviderKind,
}
