//! Reverse proxy multiplexing the token API and the main server behind one port
//!
//! Requests under the reserved prefix go to the token API, everything else to
//! the main development server. Bodies stream in both directions.

pub mod config;
pub mod error;
pub mod proxy;
pub mod routing;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use proxy::{ProxyHandle, ProxyStart, ReverseProxy};
pub use routing::{Backend, Router};
