//! Bridge orchestrator
//!
//! Startup runs in a fixed order: tunnel, then reverse proxy, then the
//! token API. A failed tunnel does not stop the bridge; it keeps serving
//! locally and reports the failure through [`Bridge::tunnel_error`].

use anyhow::Context;
use devbridge_proto::{ProviderKind, SessionEvent, TunnelInfo};
use devbridge_proxy::{ProxyHandle, ProxyStart, ReverseProxy};
use devbridge_push::{DispatchReport, NotificationContext, PushDispatcher, RelayClient};
use devbridge_tunnel::{TunnelError, TunnelManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api;
use crate::config::BridgeConfig;
use crate::error::BridgeError;

/// Shared handles of one bridge, passed to every handler.
///
/// Each bridge owns its own tunnel manager and dispatcher, so several
/// bridges can run side by side in one process.
#[derive(Clone)]
pub struct BridgeContext {
    tunnel: Arc<TunnelManager>,
    dispatcher: Arc<PushDispatcher>,
    proxy_port: u16,
}

impl BridgeContext {
    pub fn new(
        tunnel: Arc<TunnelManager>,
        dispatcher: Arc<PushDispatcher>,
        proxy_port: u16,
    ) -> Self {
        Self {
            tunnel,
            dispatcher,
            proxy_port,
        }
    }

    pub fn tunnel(&self) -> &TunnelManager {
        &self.tunnel
    }

    pub fn dispatcher(&self) -> Arc<PushDispatcher> {
        self.dispatcher.clone()
    }

    /// Port the tunnel exposes by default
    pub fn proxy_port(&self) -> u16 {
        self.proxy_port
    }

    /// Start a tunnel and advertise its URL in notifications
    pub async fn start_tunnel(
        &self,
        port: u16,
        preferred: Option<ProviderKind>,
    ) -> Result<TunnelInfo, TunnelError> {
        let info = self.tunnel.start_with(port, preferred).await?;
        self.dispatcher.set_server_url(Some(info.url.clone()));
        Ok(info)
    }

    pub async fn stop_tunnel(&self) -> Option<TunnelInfo> {
        let stopped = self.tunnel.stop().await;
        if stopped.is_some() {
            self.dispatcher.set_server_url(None);
        }
        stopped
    }

    /// Turn a session event into a push notification, if it has one
    pub async fn handle_event(
        &self,
        event: &SessionEvent,
    ) -> Result<Option<DispatchReport>, BridgeError> {
        debug!("Session event {}", event.event_type);
        Ok(self.dispatcher.send_event(event).await?)
    }
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("tunnel", &self.tunnel)
            .field("proxy_port", &self.proxy_port)
            .finish_non_exhaustive()
    }
}

struct ApiHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ApiHandle {
    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!("Token API task ended abnormally: {}", e);
        }
    }
}

/// Bind the token API; `None` when another bridge already owns the port
async fn serve_api(
    config: &BridgeConfig,
    context: BridgeContext,
) -> Result<Option<ApiHandle>, BridgeError> {
    let addr = SocketAddr::new(config.bind_host, config.api_port);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            warn!(
                "Token API port {} already in use, assuming another bridge owns it",
                config.api_port
            );
            return Ok(None);
        }
        Err(e) => {
            return Err(BridgeError::ApiBind {
                address: addr.to_string(),
                source: e,
            })
        }
    };
    let local_addr = listener.local_addr().map_err(|e| BridgeError::ApiBind {
        address: addr.to_string(),
        source: e,
    })?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = api::router(context);
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        if let Err(e) = server.await {
            error!("Token API server error: {}", e);
        }
    });

    info!("📮 Token API listening on http://{}", local_addr);
    Ok(Some(ApiHandle {
        local_addr,
        shutdown_tx: Some(shutdown_tx),
        task,
    }))
}

/// A running bridge
pub struct Bridge {
    context: BridgeContext,
    proxy: Option<ProxyHandle>,
    api: Option<ApiHandle>,
    tunnel_error: Option<TunnelError>,
}

impl Bridge {
    /// Start with the default provider chain
    pub async fn start(config: BridgeConfig) -> anyhow::Result<Self> {
        let tunnel = TunnelManager::with_default_providers(&config.tunnel_settings);
        Self::start_with(config, tunnel).await
    }

    pub async fn start_with(config: BridgeConfig, tunnel: TunnelManager) -> anyhow::Result<Self> {
        let store = config.token_store()?;
        debug!("Push tokens stored at {}", store.path().display());
        let dispatcher = PushDispatcher::new(store, RelayClient::new(config.relay_url.clone()))
            .with_context(NotificationContext {
                server_url: None,
                project_path: config.project_path.clone(),
            });
        let context =
            BridgeContext::new(Arc::new(tunnel), Arc::new(dispatcher), config.proxy_port);

        let tunnel_error = if config.tunnel {
            match context.start_tunnel(config.proxy_port, None).await {
                Ok(info) => {
                    info!("🌍 Public URL: {}", info.url);
                    None
                }
                Err(e) => {
                    warn!("Tunnel unavailable, serving locally only\n{}", e);
                    Some(e)
                }
            }
        } else {
            info!("Tunnel disabled");
            None
        };

        let proxy = match ReverseProxy::new(config.proxy_config()).start().await {
            Ok(ProxyStart::Started(handle)) => Some(handle),
            Ok(ProxyStart::AlreadyRunning { port }) => {
                warn!("Another bridge already proxies port {}", port);
                None
            }
            Err(e) => {
                context.stop_tunnel().await;
                return Err(e).context("Failed to start the reverse proxy");
            }
        };

        let api = match serve_api(&config, context.clone()).await {
            Ok(api) => api,
            Err(e) => {
                if let Some(proxy) = proxy {
                    proxy.shutdown().await;
                }
                context.stop_tunnel().await;
                return Err(e).context("Failed to start the token API");
            }
        };

        Ok(Self {
            context,
            proxy,
            api,
            tunnel_error,
        })
    }

    pub fn context(&self) -> &BridgeContext {
        &self.context
    }

    /// Why the startup tunnel could not be opened
    pub fn tunnel_error(&self) -> Option<&TunnelError> {
        self.tunnel_error.as_ref()
    }

    /// `None` when another bridge owns the proxy port
    pub fn proxy_addr(&self) -> Option<SocketAddr> {
        self.proxy.as_ref().map(ProxyHandle::local_addr)
    }

    pub fn api_addr(&self) -> Option<SocketAddr> {
        self.api.as_ref().map(|api| api.local_addr)
    }

    pub async fn handle_event(
        &self,
        event: &SessionEvent,
    ) -> Result<Option<DispatchReport>, BridgeError> {
        self.context.handle_event(event).await
    }

    /// Feed newline-delimited JSON session events until EOF.
    ///
    /// Malformed lines and failed sends are logged and skipped. Returns the
    /// number of events handled.
    pub async fn ingest_events<R>(&self, reader: R) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut handled = 0;
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event: SessionEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Skipping malformed session event: {}", e);
                    continue;
                }
            };
            if let Err(e) = self.handle_event(&event).await {
                error!("Failed to notify for {}: {}", event.event_type, e);
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Stop the token API, the proxy and the tunnel, in that order
    pub async fn shutdown(self) {
        if let Some(api) = self.api {
            api.shutdown().await;
        }
        if let Some(proxy) = self.proxy {
            proxy.shutdown().await;
        }
        if let Some(info) = self.context.stop_tunnel().await {
            info!("Tunnel {} closed", info.url);
        }
        info!("Bridge stopped");
    }
}
