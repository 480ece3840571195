//! Tunnel providers and the single-tunnel manager
//!
//! Exposes a local port through one of several third-party tunneling
//! services. Providers are tried strictly in priority order; the first one
//! that reports a public URL wins.

pub mod config;
pub mod error;
pub mod manager;
pub mod process;
pub mod provider;
pub mod providers;

pub use config::TunnelSettings;
pub use error::{ProviderFailure, TunnelError};
pub use manager::TunnelManager;
pub use provider::{validate_port, ProviderTunnel, TunnelHandle, TunnelProvider};
pub use providers::{default_providers, CloudflaredProvider, LocaltunnelProvider, NgrokProvider};

pub use devbridge_proto::{ProviderKind, TunnelInfo};
