//! Tunnel manager: ordered provider fallback with a single active tunnel

use devbridge_proto::{ProviderKind, TunnelInfo};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::TunnelSettings;
use crate::error::{ProviderFailure, TunnelError};
use crate::provider::{validate_port, TunnelHandle, TunnelProvider};
use crate::providers::default_providers;

struct ActiveTunnel {
    info: TunnelInfo,
    handle: TunnelHandle,
}

/// Owns the one active tunnel of a bridge.
///
/// Starts are serialized by `starting`, so two tunnel processes are never
/// alive at the same time. The `active` lock is only held to read or swap
/// the current tunnel, which keeps `status` and `stop` responsive while a
/// start walks the provider chain.
pub struct TunnelManager {
    providers: Vec<Arc<dyn TunnelProvider>>,
    starting: Mutex<()>,
    active: Mutex<Option<ActiveTunnel>>,
}

impl TunnelManager {
    /// Create a manager trying `providers` in the given order
    pub fn new(providers: Vec<Arc<dyn TunnelProvider>>) -> Self {
        Self {
            providers,
            starting: Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    /// ngrok, cloudflared, localtunnel
    pub fn with_default_providers(settings: &TunnelSettings) -> Self {
        Self::new(default_providers(settings))
    }

    /// Provider priority order
    pub fn providers(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(|p| p.kind()).collect()
    }

    /// Expose `port`, trying providers in priority order
    pub async fn start(&self, port: u16) -> Result<TunnelInfo, TunnelError> {
        self.start_with(port, None).await
    }

    /// Expose `port`, trying `preferred` first when given.
    ///
    /// Returns the existing tunnel unchanged if one is already active.
    pub async fn start_with(
        &self,
        port: u16,
        preferred: Option<ProviderKind>,
    ) -> Result<TunnelInfo, TunnelError> {
        let port = validate_port(port.into())?;
        let _starting = self.starting.lock().await;

        if let Some(current) = self.status().await {
            if current.port != port {
                warn!(
                    "Tunnel already active for port {} ({}); ignoring request for port {}",
                    current.port, current.url, port
                );
            }
            return Ok(current);
        }

        if self.providers.is_empty() {
            return Err(TunnelError::NoProviders);
        }

        let mut order: Vec<&Arc<dyn TunnelProvider>> = self.providers.iter().collect();
        if let Some(kind) = preferred {
            order.sort_by_key(|p| p.kind() != kind);
        }

        let mut failures = Vec::new();
        for provider in order {
            let kind = provider.kind();
            info!("Starting {} tunnel for port {}", kind, port);

            let attempt = match provider.probe().await {
                Ok(()) => provider.connect(port).await,
                Err(e) => Err(e),
            };

            match attempt {
                Ok(tunnel) => {
                    let info = TunnelInfo {
                        url: tunnel.url,
                        tunnel_id: tunnel.tunnel_id,
                        port,
                        provider: kind,
                    };
                    info!("✅ Tunnel online via {}: {}", kind, info.url);
                    *self.active.lock().await = Some(ActiveTunnel {
                        info: info.clone(),
                        handle: tunnel.handle,
                    });
                    return Ok(info);
                }
                Err(e) => {
                    warn!("{} failed, trying next provider: {}", kind, e);
                    failures.push(ProviderFailure {
                        provider: kind,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Err(TunnelError::AllProvidersFailed(failures))
    }

    /// Tear down the active tunnel; a no-op when nothing is active
    pub async fn stop(&self) -> Option<TunnelInfo> {
        let current = self.active.lock().await.take()?;
        info!(
            "Stopping {} tunnel {}",
            current.info.provider, current.info.url
        );
        current.handle.shutdown().await;
        Some(current.info)
    }

    /// The active tunnel, if any
    pub async fn status(&self) -> Option<TunnelInfo> {
        let mut active = self.active.lock().await;
        Self::reap_exited(&mut active);
        active.as_ref().map(|a| a.info.clone())
    }

    fn reap_exited(active: &mut Option<ActiveTunnel>) {
        let exited = active
            .as_mut()
            .map(|a| a.handle.has_exited())
            .unwrap_or(false);
        if exited {
            if let Some(gone) = active.take() {
                warn!(
                    "{} tunnel process for {} exited unexpectedly",
                    gone.info.provider, gone.info.url
                );
            }
        }
    }
}

impl std::fmt::Debug for TunnelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelManager")
            .field("providers", &self.providers())
            .finish_non_exhaustive()
    }
}
