//! Shared response helpers for handlers.

use axum::body::Bytes;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

/// Content type of every gate-generated JSON body.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Cache policy of every gate response.
pub const NO_STORE: &str = "no-store, no-cache, must-revalidate";

/// Serialize `body` and attach the gate's JSON headers.
///
/// Falls back to a fixed 500 body if serialization fails, which can't
/// happen for the crate's own response types.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => raw_response(status, Bytes::from(bytes), None),
        Err(e) => {
            error!(error = %e, "Failed to serialize response body");
            raw_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(br#"{"error":"Internal Server Error"}"#),
                None,
            )
        }
    }
}

/// Build a response from pre-encoded bytes.
///
/// `content_type` defaults to [`JSON_CONTENT_TYPE`].
pub fn raw_response(status: StatusCode, body: Bytes, content_type: Option<HeaderValue>) -> Response {
    let mut response = (status, body).into_response();
    set_json_headers(response.headers_mut(), content_type);
    response
}

fn set_json_headers(headers: &mut HeaderMap, content_type: Option<HeaderValue>) {
    headers.insert(
        CONTENT_TYPE,
        content_type.unwrap_or_else(|| HeaderValue::from_static(JSON_CONTENT_TYPE)),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
}
