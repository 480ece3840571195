//! Token registration HTTP API
//!
//! Mounted under `/push-token` on the token API port, behind the reverse
//! proxy. CORS is open to every origin and any `OPTIONS` request is answered
//! with `204` before routing.

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use devbridge_proto::{ErrorKind, Platform, PUSH_TOKEN_PREFIX};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};

use crate::dispatcher::{DispatchReport, PushDispatcher};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub token: Option<String>,
    /// `ios` or `android`; defaults to `ios`
    pub platform: Option<String>,
    pub device_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterRequest {
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CountResponse {
    /// Registered devices
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(
    status: StatusCode,
    message: impl Into<String>,
    kind: Option<ErrorKind>,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            kind,
        }),
    )
}

fn missing_fields() -> ApiError {
    api_error(StatusCode::BAD_REQUEST, "Missing fields", Some(ErrorKind::ConfigError))
}

/// Lenient body parsing: an empty body is treated as `{}`
fn parse_body<T: for<'de> Deserialize<'de> + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        warn!("Rejecting malformed token request: {}", e);
        api_error(StatusCode::BAD_REQUEST, "Invalid JSON", Some(ErrorKind::ConfigError))
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_platform(value: Option<&str>) -> Platform {
    match value.map(|p| p.trim().to_ascii_lowercase()).as_deref() {
        Some("android") => Platform::Android,
        _ => Platform::Ios,
    }
}

/// Count registered devices
#[utoipa::path(
    get,
    path = "/push-token",
    responses(
        (status = 200, description = "Registered device count", body = CountResponse)
    ),
    tag = "push"
)]
pub async fn count_tokens(State(dispatcher): State<Arc<PushDispatcher>>) -> Json<CountResponse> {
    Json(CountResponse {
        count: dispatcher.count(),
    })
}

/// Register or rotate a device token
#[utoipa::path(
    post,
    path = "/push-token",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Token stored", body = SuccessResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 500, description = "Token store failure", body = ErrorResponse)
    ),
    tag = "push"
)]
pub async fn register_token(
    State(dispatcher): State<Arc<PushDispatcher>>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let req: RegisterRequest = parse_body(&body)?;
    let (Some(token), Some(device_id)) = (non_empty(req.token), non_empty(req.device_id)) else {
        return Err(missing_fields());
    };

    dispatcher
        .register(&device_id, &token, parse_platform(req.platform.as_deref()))
        .map_err(|e| {
            error!("Failed to register push token: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), Some(e.kind()))
        })?;

    Ok(Json(SuccessResponse { success: true }))
}

/// Remove a device registration
#[utoipa::path(
    delete,
    path = "/push-token",
    request_body = UnregisterRequest,
    responses(
        (status = 200, description = "Token removed (or was not registered)", body = SuccessResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 500, description = "Token store failure", body = ErrorResponse)
    ),
    tag = "push"
)]
pub async fn unregister_token(
    State(dispatcher): State<Arc<PushDispatcher>>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let req: UnregisterRequest = parse_body(&body)?;
    let Some(device_id) = non_empty(req.device_id) else {
        return Err(missing_fields());
    };

    dispatcher.unregister(&device_id).map_err(|e| {
        error!("Failed to unregister push token: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), Some(e.kind()))
    })?;

    Ok(Json(SuccessResponse { success: true }))
}

/// Send a diagnostic notification to every registered device
#[utoipa::path(
    post,
    path = "/push-token/test",
    responses(
        (status = 200, description = "Test notification sent", body = SuccessResponse),
        (status = 500, description = "Relay failure", body = ErrorResponse)
    ),
    tag = "push"
)]
pub async fn send_test(
    State(dispatcher): State<Arc<PushDispatcher>>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let report: DispatchReport = dispatcher.send_test().await.map_err(|e| {
        error!("Test notification failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), Some(e.kind()))
    })?;

    if report.attempted == 0 {
        warn!("Test notification requested but no devices are registered");
    }
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Devbridge API",
        version = "0.1.0",
        description = "Push token registration and tunnel control for a local development bridge"
    ),
    paths(count_tokens, register_token, unregister_token, send_test),
    components(schemas(
        RegisterRequest,
        UnregisterRequest,
        CountResponse,
        SuccessResponse,
        ErrorResponse,
        ErrorKind,
        Platform
    )),
    tags((name = "push", description = "Push token registration"))
)]
pub struct PushApiDoc;

/// Push token routes
pub fn router(dispatcher: Arc<PushDispatcher>) -> Router {
    Router::new()
        .route(
            PUSH_TOKEN_PREFIX,
            get(count_tokens)
                .post(register_token)
                .delete(unregister_token),
        )
        .route(&format!("{}/test", PUSH_TOKEN_PREFIX), post(send_test))
        .with_state(dispatcher)
}

async fn preflight(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return (
            StatusCode::NO_CONTENT,
            [
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
                (
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    "GET, POST, DELETE, OPTIONS",
                ),
                (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            ],
        )
            .into_response();
    }
    next.run(req).await
}

/// Open CORS for every origin and answer all preflights with `204`
pub fn with_cors(router: Router) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    router
        .layer(cors)
        .layer(middleware::from_fn(preflight))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platform() {
        assert_eq!(parse_platform(Some("android")), Platform::Android);
        assert_eq!(parse_platform(Some(" Android ")), Platform::Android);
        assert_eq!(parse_platform(Some("ios")), Platform::Ios);
        assert_eq!(parse_platform(Some("web")), Platform::Ios);
        assert_eq!(parse_platform(None), Platform::Ios);
    }

    #[test]
    fn test_empty_body_parses_as_default() {
        let req: RegisterRequest = parse_body(&Bytes::from_static(b"  ")).unwrap();
        assert!(req.token.is_none());

        let err = parse_body::<RegisterRequest>(&Bytes::from_static(b"{nope")).unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_openapi_lists_push_paths() {
        let doc = PushApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/push-token"));
        assert!(doc.paths.paths.contains_key("/push-token/test"));
    }
}
