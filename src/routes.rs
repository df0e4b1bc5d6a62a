//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │   Request ID     │ ← X-Request-Id on request and response
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← span per request, tagged with the request ID
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ Baseline headers │ ← nosniff, Referrer-Policy, Permissions-Policy
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │      CORS        │ ← Origin echo, Vary: Origin
//! └────────┬─────────┘
//!          │
//!          ▼
//!    rpc_gate handler
//! ```
//!
//! # Routes
//!
//! - `{RPC_PATH}` (default `/api/rpc`), every method: the gate

use axum::Router;
use axum::body::Body;
use axum::http::header::{REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware;
use axum::routing::any;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};

use crate::handlers;
use crate::middleware::{RequestIdExt, RequestIdLayer, cors_middleware};
use crate::state::AppState;

/// Build the application router with the gate mounted on `config.rpc_path`.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    info!(
        path = %config.rpc_path,
        max_body_bytes = config.max_body_bytes,
        upstream_timeout_ms = config.upstream_timeout.as_millis() as u64,
        "Mounting RPC gate"
    );

    if config.rate_limiting_enabled() {
        info!(
            max_requests = config.rate_limit_max_requests,
            window_ms = config.rate_limit_window.as_millis() as u64,
            trusted_proxies = config.trusted_proxies.len(),
            "Rate limiting enabled"
        );
    } else {
        info!("Rate limiting disabled (RATE_LIMIT_MAX_REQUESTS=0)");
    }

    let cors = state.cors.clone();

    Router::new()
        .route(&config.rpc_path, any(handlers::rpc_gate))
        // Layers apply bottom to top: the last one added runs first.
        .layer(middleware::from_fn_with_state(cors, cors_middleware))
        .layer(SetResponseHeaderLayer::overriding(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            REFERRER_POLICY,
            HeaderValue::from_static("same-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                info_span!(
                    "request",
                    method = %req.method(),
                    path = %req.uri().path(),
                    request_id = req.request_id().unwrap_or("-"),
                )
            }),
        )
        .layer(RequestIdLayer::new())
        .with_state(state)
}
