//! Token API server: push routes, tunnel control and the OpenAPI document

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use devbridge_proto::{ErrorKind, ProviderKind, TunnelInfo};
use devbridge_push::api::{self as push_api, api_error, ApiError, ErrorResponse, PushApiDoc};
use devbridge_tunnel::{validate_port, TunnelError};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use crate::bridge::BridgeContext;

/// Current tunnel, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TunnelStatus {
    Active(TunnelInfo),
    None,
}

impl From<Option<TunnelInfo>> for TunnelStatus {
    fn from(info: Option<TunnelInfo>) -> Self {
        info.map_or(TunnelStatus::None, TunnelStatus::Active)
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StartTunnelRequest {
    /// Local port to expose; defaults to the proxy port
    pub port: Option<i64>,
    /// Provider to try first (`ngrok`, `cloudflared`, `localtunnel`)
    pub provider: Option<String>,
}

fn tunnel_error(e: TunnelError) -> ApiError {
    let status = match e.kind() {
        ErrorKind::ConfigError => StatusCode::BAD_REQUEST,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    api_error(status, e.to_string(), Some(e.kind()))
}

/// Current tunnel or `{"type": "none"}`
#[utoipa::path(
    get,
    path = "/tunnel",
    responses((status = 200, description = "Tunnel status", body = TunnelStatus)),
    tag = "tunnel"
)]
pub async fn get_tunnel(State(ctx): State<BridgeContext>) -> Json<TunnelStatus> {
    Json(ctx.tunnel().status().await.into())
}

/// Start a tunnel, trying providers in priority order
#[utoipa::path(
    post,
    path = "/tunnel",
    request_body = StartTunnelRequest,
    responses(
        (status = 200, description = "Tunnel active", body = TunnelStatus),
        (status = 400, description = "Invalid port or provider", body = ErrorResponse),
        (status = 503, description = "Every provider failed", body = ErrorResponse)
    ),
    tag = "tunnel"
)]
pub async fn start_tunnel(
    State(ctx): State<BridgeContext>,
    body: Bytes,
) -> Result<Json<TunnelStatus>, ApiError> {
    let req: StartTunnelRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartTunnelRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| {
            api_error(StatusCode::BAD_REQUEST, "Invalid JSON", Some(ErrorKind::ConfigError))
        })?
    };

    let port = match req.port {
        Some(port) => validate_port(port).map_err(tunnel_error)?,
        None => ctx.proxy_port(),
    };
    let preferred = match req.provider.as_deref() {
        Some(name) => Some(ProviderKind::parse(name).ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("Unknown provider '{}'", name),
                Some(ErrorKind::ConfigError),
            )
        })?),
        None => None,
    };

    let info = ctx.start_tunnel(port, preferred).await.map_err(|e| {
        error!("Tunnel start failed: {}", e);
        tunnel_error(e)
    })?;
    Ok(Json(TunnelStatus::Active(info)))
}

/// Stop the active tunnel; returns what was stopped
#[utoipa::path(
    delete,
    path = "/tunnel",
    responses((status = 200, description = "Tunnel stopped (or none was active)", body = TunnelStatus)),
    tag = "tunnel"
)]
pub async fn stop_tunnel(State(ctx): State<BridgeContext>) -> Json<TunnelStatus> {
    let stopped = ctx.stop_tunnel().await;
    if stopped.is_none() {
        info!("Tunnel stop requested but no tunnel was active");
    }
    Json(stopped.into())
}

#[derive(OpenApi)]
#[openapi(
    paths(get_tunnel, start_tunnel, stop_tunnel),
    components(schemas(TunnelStatus, StartTunnelRequest, TunnelInfo, ProviderKind)),
    tags((name = "tunnel", description = "Tunnel control"))
)]
pub struct TunnelApiDoc;

/// Combined OpenAPI document of the token API port
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = PushApiDoc::openapi();
    doc.merge(TunnelApiDoc::openapi());
    doc
}

/// Every route served on the token API port
pub fn router(ctx: BridgeContext) -> Router {
    let doc = openapi();
    let tunnel = Router::new()
        .route(
            "/tunnel",
            get(get_tunnel).post(start_tunnel).delete(stop_tunnel),
        )
        .with_state(ctx.clone());

    let app = push_api::router(ctx.dispatcher())
        .merge(tunnel)
        .route(
            "/api-docs/openapi.json",
            get(move || async move { Json(doc) }),
        );

    push_api::with_cors(app).layer(TraceLayer::new_for_http())
}
