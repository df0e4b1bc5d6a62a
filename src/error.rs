use axum::http::header::{ALLOW, HeaderValue, RETRY_AFTER};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::handlers::util::json_response;
use crate::metrics;
use crate::models::ErrorBody;
use crate::upstream::UpstreamError;

/// Methods advertised in the `Allow` header of a 405.
pub const ALLOWED_HTTP_METHODS: &str = "POST, GET, OPTIONS";

/// Gate and startup errors, each mapped to exactly one HTTP status.
///
/// The client-facing message is fixed per variant. Only `RpcMethodNotAllowed`
/// echoes client input back, and only the method name the client sent.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid JSON-RPC payload")]
    InvalidPayload,

    #[error("Invalid JSON-RPC")]
    InvalidRpc,

    #[error("RPC method not allowed: {0}")]
    RpcMethodNotAllowed(String),

    #[error("Method Not Allowed")]
    HttpMethodNotAllowed,

    #[error("Request entity too large")]
    PayloadTooLarge,

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64, limit: u32 },

    #[error("RPC not configured")]
    NotConfigured,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidPayload | AppError::InvalidRpc => StatusCode::BAD_REQUEST,
            AppError::RpcMethodNotAllowed(_) => StatusCode::FORBIDDEN,
            AppError::HttpMethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotConfigured | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Upstream(UpstreamError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short label used for the outcome metric and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            AppError::InvalidPayload => "invalid_payload",
            AppError::InvalidRpc => "invalid_rpc",
            AppError::RpcMethodNotAllowed(_) => "method_forbidden",
            AppError::HttpMethodNotAllowed => "http_method_not_allowed",
            AppError::PayloadTooLarge => "payload_too_large",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::NotConfigured => "not_configured",
            AppError::Upstream(UpstreamError::Timeout(_)) => "upstream_timeout",
            AppError::Upstream(_) => "upstream_error",
            AppError::Config(_) => "config_error",
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            AppError::Upstream(UpstreamError::Timeout(_)) => ErrorBody::new("Upstream timeout"),
            AppError::Upstream(e) => ErrorBody::with_details("Upstream error", e.category()),
            // Operators see the detail in the log; clients get the generic line.
            AppError::Config(_) => ErrorBody::new("RPC not configured"),
            other => ErrorBody::new(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let outcome = self.outcome();

        if status.is_server_error() {
            // UpstreamError's Display never includes the URL or key.
            tracing::error!(error = %self, outcome, status = status.as_u16(), "Request failed");
        } else {
            tracing::warn!(error = %self, outcome, status = status.as_u16(), "Request rejected");
        }
        metrics::record_request_outcome(outcome);

        let mut response = json_response(status, &self.body());
        let headers = response.headers_mut();

        match self {
            AppError::HttpMethodNotAllowed => {
                headers.insert(ALLOW, HeaderValue::from_static(ALLOWED_HTTP_METHODS));
            }
            AppError::RateLimited {
                retry_after_secs,
                limit,
            } => {
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
                headers.insert(
                    HeaderName::from_static("x-ratelimit-limit"),
                    HeaderValue::from(limit),
                );
            }
            _ => {}
        }

        response
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
