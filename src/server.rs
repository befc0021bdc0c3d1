//! HTTP surface for the headless render service.
//!
//! One authenticated endpoint: `POST /render` takes a wire
//! [`RenderRequest`](crate::headless::RenderRequest) and answers with PNG
//! bytes (`Cache-Control: no-store`) or a JSON `{"error"}` body whose
//! status follows the failure taxonomy: 401 auth, 400 validation, 504
//! upstream timeout, 502 anything else.

use std::sync::Arc;

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::headless::{validate, HeadlessRenderService, RenderError, RenderRequest};
use crate::Error;

/// Server-side settings, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Bearer token callers must present. `None` with
    /// `allow_unauthenticated` unset means every request is refused.
    pub token: Option<String>,
    /// Explicitly opt in to unauthenticated rendering.
    pub allow_unauthenticated: bool,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            token: std::env::var("CARDSHOT_TOKEN").ok().filter(|t| !t.is_empty()),
            allow_unauthenticated: std::env::var("CARDSHOT_ALLOW_UNAUTHENTICATED")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}

/// Shared state injected into handlers. The registry and config inside
/// are read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<HeadlessRenderService>,
    pub token: Option<String>,
    pub allow_unauthenticated: bool,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Auth => StatusCode::UNAUTHORIZED,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => {
                tracing::error!("render failed: {self}");
                StatusCode::BAD_GATEWAY
            }
        };
        // Message passthrough without internals; stack traces never cross
        // this boundary.
        let body = RenderError {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Build the router with CORS and request tracing attached.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/render", post(render_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn render_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<RenderRequest>, JsonRejection>,
) -> Response {
    if let Err(e) = authorize(&state, &headers) {
        return e.into_response();
    }

    // A body that does not deserialize is a validation failure like any
    // other; the extractor's default rejection would bypass the taxonomy.
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => return Error::Validation(rejection.body_text()).into_response(),
    };

    // Shape and template checks run before any browser process exists.
    if let Err(e) = validate(&req, state.service.registry()) {
        return e.into_response();
    }

    match render(&state, &req).await {
        Ok(png) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/png"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            png,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

#[cfg(feature = "chrome")]
async fn render(state: &AppState, req: &RenderRequest) -> crate::Result<Vec<u8>> {
    state.service.render(req).await
}

#[cfg(not(feature = "chrome"))]
async fn render(_state: &AppState, _req: &RenderRequest) -> crate::Result<Vec<u8>> {
    Err(Error::Other(
        "built without the 'chrome' feature; headless rendering unavailable".into(),
    ))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> crate::Result<()> {
    if state.allow_unauthenticated {
        return Ok(());
    }
    let expected = state.token.as_deref().ok_or(Error::Auth)?;
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(Error::Auth)?;
    if presented != expected {
        return Err(Error::Auth);
    }
    Ok(())
}
