//! Tunnel provider settings

use std::time::Duration;

/// Environment variable overriding the ngrok auth token
pub const NGROK_AUTHTOKEN_ENV: &str = "NGROK_AUTHTOKEN";
/// Environment variable selecting the ngrok region
pub const NGROK_REGION_ENV: &str = "NGROK_REGION";

/// Settings shared by the provider adapters
#[derive(Debug, Clone)]
pub struct TunnelSettings {
    /// Auth token passed to the primary provider instead of its stored config
    pub ngrok_authtoken: Option<String>,
    /// Region hint for the primary provider (e.g. "eu", "ap")
    pub ngrok_region: Option<String>,
    /// Base URL of the local ngrok agent API
    pub ngrok_agent_api: String,
    /// How long a provider may take to report its public URL
    pub connect_timeout: Duration,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            ngrok_authtoken: None,
            ngrok_region: None,
            ngrok_agent_api: "http://127.0.0.1:4040".to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl TunnelSettings {
    /// Read the provider overrides from the process environment.
    ///
    /// Called once at bridge startup; later changes to the environment are not observed.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            ngrok_authtoken: non_empty(NGROK_AUTHTOKEN_ENV),
            ngrok_region: non_empty(NGROK_REGION_ENV),
            ..Default::default()
        }
    }
}
