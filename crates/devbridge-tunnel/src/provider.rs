//! Uniform provider contract

use async_trait::async_trait;
use devbridge_proto::ProviderKind;
use tokio::process::Child;
use tracing::{debug, warn};

use crate::error::TunnelError;

/// Reject ports that cannot be exposed
pub fn validate_port(port: i64) -> Result<u16, TunnelError> {
    u16::try_from(port)
        .ok()
        .filter(|p| *p > 0)
        .ok_or(TunnelError::InvalidPort(port))
}

/// Keeps a provider tunnel alive
#[derive(Debug)]
pub enum TunnelHandle {
    /// Tunnel is a child process owned by this bridge
    Process(Child),
    /// Tunnel was already running outside this bridge; it is left alone on stop
    Adopted,
}

impl TunnelHandle {
    /// Whether an owned process has exited on its own
    pub fn has_exited(&mut self) -> bool {
        match self {
            TunnelHandle::Process(child) => matches!(child.try_wait(), Ok(Some(_))),
            TunnelHandle::Adopted => false,
        }
    }

    /// Kill and reap an owned process
    pub async fn shutdown(self) {
        match self {
            TunnelHandle::Process(mut child) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill tunnel process: {}", e);
                } else {
                    debug!("Tunnel process terminated");
                }
            }
            TunnelHandle::Adopted => {
                debug!("Leaving adopted tunnel running");
            }
        }
    }
}

/// A tunnel reported by a provider
#[derive(Debug)]
pub struct ProviderTunnel {
    pub url: String,
    pub tunnel_id: String,
    pub handle: TunnelHandle,
}

/// One adapter per tunneling service
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Which service this adapter drives
    fn kind(&self) -> ProviderKind;

    /// Check that the runtime prerequisite is discoverable before connecting
    async fn probe(&self) -> Result<(), TunnelError>;

    /// Expose `port` and return the assigned public URL
    async fn connect(&self, port: u16) -> Result<ProviderTunnel, TunnelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port(3000).unwrap(), 3000);
        assert_eq!(validate_port(65535).unwrap(), 65535);
        assert!(matches!(validate_port(0), Err(TunnelError::InvalidPort(0))));
        assert!(matches!(validate_port(-1), Err(TunnelError::InvalidPort(-1))));
        assert!(matches!(
            validate_port(70000),
            Err(TunnelError::InvalidPort(70000))
        ));
    }

    #[tokio::test]
    async fn test_adopted_handle_never_exits() {
        let mut handle = TunnelHandle::Adopted;
        assert!(!handle.has_exited());
        handle.shutdown().await;
    }
}
