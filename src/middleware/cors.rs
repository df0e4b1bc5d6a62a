//! Origin echo for browser callers.
//!
//! The gate answers preflights itself (see `handlers::rpc`), so this layer
//! only decides whether the caller's `Origin` is echoed back in
//! `Access-Control-Allow-Origin`. An origin is accepted when it ends with one
//! of the configured suffixes or contains `localhost`. `Vary: Origin` is set
//! on every response regardless.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY};
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

/// Origin acceptance rules.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    suffixes: Vec<String>,
}

impl CorsPolicy {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self { suffixes }
    }

    pub fn allows(&self, origin: &str) -> bool {
        origin.contains("localhost") || self.suffixes.iter().any(|s| origin.ends_with(s.as_str()))
    }
}

/// Echo an accepted `Origin` and always add `Vary: Origin`.
pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .filter(|value| value.to_str().is_ok_and(|o| policy.allows(o)))
        .cloned();

    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    if let Some(origin) = origin {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    }
    headers.insert(VARY, HeaderValue::from_static("Origin"));

    response
}
