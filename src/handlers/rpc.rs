//! The request gate.
//!
//! One handler answers every method on the RPC path. `POST` runs the
//! admission pipeline below; each stage returns `AppResult` and the first
//! failure becomes the response.
//!
//! ```text
//! POST
//!   │
//!   ├─ upstream configured?      ── no  → 500 RPC not configured
//!   ├─ Content-Length ≤ ceiling? ── no  → 413 (body never read)
//!   ├─ rate limit (client key)   ── over → 429
//!   ├─ read body (hard cap)      ── over → 413, broken → 400
//!   ├─ parse + shape check       ── bad → 400
//!   ├─ method whitelist          ── bad → 403
//!   └─ upstream (hard timeout)   ── timeout → 504, failure → 502
//!                                   ok → upstream status + bytes
//! ```

use std::borrow::Cow;
use std::error::Error as StdError;

use axum::body::{Body, Bytes, to_bytes};
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, CONTENT_LENGTH,
};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use tracing::{debug, info, warn};

use super::health::health;
use super::util::raw_response;
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::middleware::{RateLimitDecision, RequestIdExt, client_identity, retry_after_secs};
use crate::models::RpcPayload;
use crate::state::AppState;
use crate::upstream::UpstreamClient;

/// Methods advertised on a preflight.
const PREFLIGHT_ALLOW_METHODS: &str = "POST, GET";

/// Headers advertised on a preflight.
const PREFLIGHT_ALLOW_HEADERS: &str = "content-type";

/// Entry point mounted on the RPC path for all HTTP methods.
pub async fn rpc_gate(State(state): State<AppState>, request: Request<Body>) -> Response {
    match *request.method() {
        Method::OPTIONS => preflight(),
        Method::GET => health(&state),
        Method::POST => match forward(&state, request).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        },
        _ => AppError::HttpMethodNotAllowed.into_response(),
    }
}

fn preflight() -> Response {
    metrics::record_request_outcome("preflight");
    (
        StatusCode::NO_CONTENT,
        [
            (
                ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(PREFLIGHT_ALLOW_METHODS),
            ),
            (
                ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(PREFLIGHT_ALLOW_HEADERS),
            ),
        ],
    )
        .into_response()
}

async fn forward(state: &AppState, request: Request<Body>) -> AppResult<Response> {
    let upstream = configured_upstream(state)?;
    check_declared_length(request.headers(), state.config.max_body_bytes)?;

    let client = client_identity(&request, &state.trusted_proxies);
    admit(state, &client)?;

    let request_id = request.request_id().unwrap_or("-").to_string();
    let body = read_body(request.into_body(), state.config.max_body_bytes).await?;

    let payload = RpcPayload::parse(&body)?;
    state.allowed_methods.check(&payload)?;

    debug!(
        request_id = %request_id,
        client = %client,
        calls = payload.calls().len(),
        batch = payload.is_batch(),
        "Forwarding JSON-RPC payload"
    );

    let reply = upstream.forward(payload.as_json().to_owned()).await?;

    for call in payload.calls() {
        metrics::record_forwarded_call(call.method());
    }
    metrics::record_request_outcome("forwarded");
    info!(
        request_id = %request_id,
        status = reply.status.as_u16(),
        calls = payload.calls().len(),
        "Relayed upstream response"
    );

    Ok(raw_response(reply.status, reply.body, reply.content_type))
}

fn configured_upstream(state: &AppState) -> AppResult<&UpstreamClient> {
    state.upstream.as_ref().ok_or(AppError::NotConfigured)
}

/// Reject on the declared length alone, before any body byte is read.
///
/// A missing or unparseable header passes; the capped read in
/// [`read_body`] still bounds the body.
fn check_declared_length(headers: &HeaderMap, max_body_bytes: usize) -> AppResult<()> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    match declared {
        Some(len) if len > max_body_bytes as u64 => {
            debug!(declared = len, max = max_body_bytes, "Declared body exceeds ceiling");
            Err(AppError::PayloadTooLarge)
        }
        _ => Ok(()),
    }
}

fn admit(state: &AppState, client: &Cow<'static, str>) -> AppResult<()> {
    match state.limiter.check(client) {
        RateLimitDecision::Allowed => Ok(()),
        RateLimitDecision::Limited { retry_after } => {
            warn!(client = %client, "Rate limit exceeded");
            Err(AppError::RateLimited {
                retry_after_secs: retry_after_secs(retry_after),
                limit: state.limiter.limit(),
            })
        }
    }
}

/// Read the body under the hard cap.
///
/// Only hitting the cap is a 413. A body that fails mid-stream is treated as
/// an unreadable payload.
async fn read_body(body: Body, max_body_bytes: usize) -> AppResult<Bytes> {
    to_bytes(body, max_body_bytes).await.map_err(|e| {
        debug!(error = %e, "Request body rejected");
        if exceeded_length_limit(e) {
            AppError::PayloadTooLarge
        } else {
            AppError::InvalidPayload
        }
    })
}

fn exceeded_length_limit(err: axum::Error) -> bool {
    let inner = err.into_inner();
    let root: &(dyn StdError + 'static) = inner.as_ref();
    std::iter::successors(Some(root), |e| (*e).source()).any(|e| e.is::<LengthLimitError>())
}
