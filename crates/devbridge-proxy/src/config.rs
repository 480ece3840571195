//! Proxy configuration

use devbridge_proto::PUSH_TOKEN_PREFIX;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address the proxy listens on
    pub bind_host: IpAddr,
    /// Port the tunnel points at (0 picks an ephemeral port)
    pub proxy_port: u16,
    /// Token API backend
    pub token_api_port: u16,
    /// Main development server backend
    pub main_port: u16,
    /// Host both backends listen on
    pub backend_host: String,
    /// Paths starting with this go to the token API
    pub reserved_prefix: String,
    /// Limit for a backend to start answering; response bodies may stream longer
    pub request_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            proxy_port: 4098,
            token_api_port: 4097,
            main_port: 4096,
            backend_host: "127.0.0.1".to_string(),
            reserved_prefix: PUSH_TOKEN_PREFIX.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}
