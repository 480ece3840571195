//! Development bridge orchestrator
//!
//! Wires the tunnel manager, reverse proxy and push dispatcher into one
//! [`Bridge`] and serves the token API (push registration, tunnel control,
//! OpenAPI document) behind the proxy.
//!
//! ```ignore
//! use devbridge_lib::{Bridge, BridgeConfig};
//!
//! let bridge = Bridge::start(BridgeConfig::from_env()).await?;
//! if let Some(err) = bridge.tunnel_error() {
//!     eprintln!("local only: {}", err);
//! }
//! tokio::signal::ctrl_c().await?;
//! bridge.shutdown().await;
//! ```

pub mod api;
pub mod bridge;
pub mod config;
pub mod error;

pub use api::TunnelStatus;
pub use bridge::{Bridge, BridgeContext};
pub use config::{BridgeConfig, DEFAULT_API_PORT, DEFAULT_MAIN_PORT, DEFAULT_PROXY_PORT};
pub use error::BridgeError;

pub use devbridge_proto as proto;
pub use devbridge_proxy as proxy;
pub use devbridge_push as push;
pub use devbridge_tunnel as tunnel;
