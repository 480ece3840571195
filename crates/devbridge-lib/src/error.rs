//! Bridge errors

use devbridge_proto::ErrorKind;
use devbridge_proxy::ProxyError;
use devbridge_push::PushError;
use devbridge_tunnel::TunnelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Failed to bind token API to {address}: {source}")]
    ApiBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot locate a home directory for the push token store")]
    NoStorePath,

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error(transparent)]
    Push(#[from] PushError),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::ApiBind { .. } | BridgeError::NoStorePath => ErrorKind::ConfigError,
            BridgeError::Tunnel(e) => e.kind(),
            BridgeError::Proxy(e) => e.kind(),
            BridgeError::Push(e) => e.kind(),
        }
    }
}
