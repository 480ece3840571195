//! Provider adapters, in default priority order

mod cloudflared;
mod localtunnel;
mod ngrok;

pub use cloudflared::CloudflaredProvider;
pub use localtunnel::LocaltunnelProvider;
pub use ngrok::NgrokProvider;

use std::sync::Arc;
use tracing::debug;

use crate::config::TunnelSettings;
use crate::error::TunnelError;
use crate::provider::TunnelProvider;
use devbridge_proto::ProviderKind;

/// ngrok first, then cloudflared, then localtunnel
pub fn default_providers(settings: &TunnelSettings) -> Vec<Arc<dyn TunnelProvider>> {
    vec![
        Arc::new(NgrokProvider::new(settings)),
        Arc::new(CloudflaredProvider::new(settings)),
        Arc::new(LocaltunnelProvider::new(settings)),
    ]
}

/// Locate a provider binary on the search path
pub(crate) fn find_binary(provider: ProviderKind, program: &str) -> Result<(), TunnelError> {
    match which::which(program) {
        Ok(path) => {
            debug!("Found {} at {}", provider, path.display());
            Ok(())
        }
        Err(e) => Err(TunnelError::Unavailable {
            provider,
            reason: format!("'{}' not found on PATH ({})", program, e),
        }),
    }
}
