//! Streaming HTTP reverse proxy
//!
//! Uses hyper with a pooled client to forward each request to its backend:
//! - Request and response bodies are streamed, never collected
//! - Backend connection failures become `502 Bad Gateway`
//! - Dropping the client connection drops the backend response, which
//!   closes the backend connection

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, HOST};
use http::{Request, Response, StatusCode, Uri};
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::routing::Router;

type ProxyBody = BoxBody<Bytes, hyper::Error>;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Outcome of starting the proxy
#[derive(Debug)]
pub enum ProxyStart {
    Started(ProxyHandle),
    /// The port is taken, assumed to be another bridge instance
    AlreadyRunning { port: u16 },
}

/// Running proxy; dropping it leaves the accept loop running until `shutdown`
#[derive(Debug)]
pub struct ProxyHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ProxyHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for the accept loop to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!("Proxy task ended abnormally: {}", e);
        }
    }
}

struct Forwarder {
    router: Router,
    backend_host: String,
    client: Client<HttpConnector, Incoming>,
    request_timeout: Duration,
}

/// Single inbound listener in front of the token API and main server
pub struct ReverseProxy {
    config: ProxyConfig,
}

impl ReverseProxy {
    pub fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    /// Bind and start serving.
    ///
    /// A port that is already in use is reported as `AlreadyRunning`, not as an error.
    pub async fn start(self) -> Result<ProxyStart, ProxyError> {
        let addr = SocketAddr::new(self.config.bind_host, self.config.proxy_port);
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                info!(
                    "Proxy port {} already in use, assuming another bridge owns it",
                    self.config.proxy_port
                );
                return Ok(ProxyStart::AlreadyRunning {
                    port: self.config.proxy_port,
                });
            }
            Err(e) => {
                return Err(ProxyError::Bind {
                    address: addr.to_string(),
                    source: e,
                })
            }
        };
        let local_addr = listener.local_addr()?;

        let forwarder = Arc::new(Forwarder {
            router: Router::new(
                self.config.reserved_prefix.clone(),
                self.config.token_api_port,
                self.config.main_port,
            ),
            backend_host: self.config.backend_host.clone(),
            client: Client::builder(TokioExecutor::new()).build_http(),
            request_timeout: self.config.request_timeout,
        });

        info!(
            "🔀 Proxy listening on http://{} ({}* → :{}, else → :{})",
            local_addr,
            self.config.reserved_prefix,
            self.config.token_api_port,
            self.config.main_port
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, forwarder, shutdown_rx));

        Ok(ProxyStart::Started(ProxyHandle {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
        }))
    }
}

async fn accept_loop(
    listener: TcpListener,
    forwarder: Arc<Forwarder>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    loop {
        let (stream, peer) = tokio::select! {
            _ = &mut shutdown_rx => {
                info!("Proxy shutting down");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept proxy connection: {}", e);
                    continue;
                }
            }
        };

        let forwarder = forwarder.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let forwarder = forwarder.clone();
                async move { Ok::<_, Infallible>(forwarder.forward(req, peer).await) }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Proxy connection from {} closed: {}", peer, e);
            }
        });
    }
}

fn text_response(status: StatusCode, message: &'static str) -> Response<ProxyBody> {
    let mut response = Response::new(
        Full::new(Bytes::from_static(message.as_bytes()))
            .map_err(|never| match never {})
            .boxed(),
    );
    *response.status_mut() = status;
    response
}

impl Forwarder {
    async fn forward(&self, mut req: Request<Incoming>, peer: SocketAddr) -> Response<ProxyBody> {
        let backend = self.router.route(req.uri().path());
        let port = self.router.port(backend);
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let uri = match Uri::builder()
            .scheme("http")
            .authority(format!("{}:{}", self.backend_host, port))
            .path_and_query(path_and_query.as_str())
            .build()
        {
            Ok(uri) => uri,
            Err(e) => {
                warn!("Cannot build backend URI for {}: {}", path_and_query, e);
                return text_response(StatusCode::BAD_REQUEST, "Bad Request");
            }
        };
        *req.uri_mut() = uri;
        add_forwarding_headers(req.headers_mut(), peer);

        debug!(
            "{} {} → {} (:{})",
            req.method(),
            path_and_query,
            backend.as_str(),
            port
        );

        match tokio::time::timeout(self.request_timeout, self.client.request(req)).await {
            Ok(Ok(response)) => response.map(|body| body.boxed()),
            Ok(Err(e)) => {
                warn!(
                    "Backend {} on port {} failed for {}: {}",
                    backend.as_str(),
                    port,
                    path_and_query,
                    e
                );
                text_response(StatusCode::BAD_GATEWAY, "Bad Gateway")
            }
            Err(_) => {
                warn!(
                    "Backend {} on port {} did not answer {} within {:?}",
                    backend.as_str(),
                    port,
                    path_and_query,
                    self.request_timeout
                );
                text_response(StatusCode::GATEWAY_TIMEOUT, "Gateway Timeout")
            }
        }
    }
}

fn add_forwarding_headers(headers: &mut http::HeaderMap, peer: SocketAddr) {
    let client_ip = peer.ip().to_string();
    let forwarded_for = match headers
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
    {
        Some(existing) if !existing.is_empty() => format!("{}, {}", existing, client_ip),
        _ => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert(X_FORWARDED_FOR, value);
    }

    if !headers.contains_key(&X_FORWARDED_HOST) {
        if let Some(host) = headers.get(HOST).cloned() {
            headers.insert(X_FORWARDED_HOST, host);
        }
    }
}
