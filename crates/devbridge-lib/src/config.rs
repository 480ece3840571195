//! Bridge configuration

use devbridge_proto::PUSH_TOKEN_PREFIX;
use devbridge_proxy::ProxyConfig;
use devbridge_push::{TokenStore, EXPO_PUSH_URL};
use devbridge_tunnel::TunnelSettings;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::error::BridgeError;

pub const DEFAULT_MAIN_PORT: u16 = 4096;
pub const DEFAULT_API_PORT: u16 = 4097;
pub const DEFAULT_PROXY_PORT: u16 = 4098;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Development server (everything outside the reserved prefix)
    pub main_port: u16,
    /// Token API served by the bridge itself
    pub api_port: u16,
    /// Proxy in front of both; the tunnel points here
    pub proxy_port: u16,
    pub bind_host: IpAddr,
    /// Project shown in notifications
    pub project_path: Option<String>,
    pub reserved_prefix: String,
    /// Open a public tunnel on startup
    pub tunnel: bool,
    pub relay_url: String,
    /// Token registry file; `~/.devbridge/push-tokens.json` when unset
    pub store_path: Option<PathBuf>,
    pub tunnel_settings: TunnelSettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            main_port: DEFAULT_MAIN_PORT,
            api_port: DEFAULT_API_PORT,
            proxy_port: DEFAULT_PROXY_PORT,
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            project_path: None,
            reserved_prefix: PUSH_TOKEN_PREFIX.to_string(),
            tunnel: true,
            relay_url: EXPO_PUSH_URL.to_string(),
            store_path: None,
            tunnel_settings: TunnelSettings::default(),
        }
    }
}

impl BridgeConfig {
    /// Defaults plus the provider overrides from the environment
    pub fn from_env() -> Self {
        Self {
            tunnel_settings: TunnelSettings::from_env(),
            ..Default::default()
        }
    }

    pub fn proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            bind_host: self.bind_host,
            proxy_port: self.proxy_port,
            token_api_port: self.api_port,
            main_port: self.main_port,
            reserved_prefix: self.reserved_prefix.clone(),
            ..Default::default()
        }
    }

    pub fn token_store(&self) -> Result<TokenStore, BridgeError> {
        self.store_path
            .clone()
            .or_else(TokenStore::default_path)
            .map(TokenStore::new)
            .ok_or(BridgeError::NoStorePath)
    }
}
