//! Proxy errors

use devbridge_proto::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Failed to bind proxy to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Bind { .. } => ErrorKind::ConfigError,
            ProxyError::Io(_) => ErrorKind::Unknown,
        }
    }
}
