//! Push errors

use devbridge_proto::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Push relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Push relay rejected the request ({status}): {message}")]
    Relay { status: u16, message: String },

    #[error("Unexpected push relay response: {0}")]
    InvalidResponse(String),

    #[error("Failed to write token store {path:?}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize token store: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PushError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PushError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            PushError::Http(e) if e.is_connect() => ErrorKind::NetworkUnreachable,
            PushError::Http(e) => match e.status() {
                Some(status) if status.is_server_error() => ErrorKind::ServerError,
                _ => ErrorKind::Unknown,
            },
            PushError::Relay { status, .. } if *status >= 500 => ErrorKind::ServerError,
            _ => ErrorKind::Unknown,
        }
    }
}
