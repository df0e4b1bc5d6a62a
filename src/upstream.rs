//! Upstream JSON-RPC client with a hard deadline.
//!
//! One exchange (connect, send, read the full response body) runs inside a
//! single `tokio::time::timeout`. When the deadline passes the in-flight
//! future is dropped, which aborts the request and releases the timer; the
//! same drop happens on success and on failure, so no timer outlives the
//! call.
//!
//! # Secrecy
//!
//! The upstream URL embeds the provider key. It is never logged, and
//! [`UpstreamError`] carries only fixed categories, never `reqwest` error
//! text (which includes the URL).

use std::fmt;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics;

/// Upstream failures, each tied to a sanitised category.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Upstream connection failed")]
    Connect,

    #[error("Upstream request failed")]
    Request,

    #[error("Upstream response body could not be read")]
    Body,
}

impl UpstreamError {
    /// Fixed category string safe to return to clients.
    pub fn category(&self) -> &'static str {
        match self {
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::Connect => "connection failed",
            UpstreamError::Request => "request failed",
            UpstreamError::Body => "response body error",
        }
    }

    fn from_send(error: &reqwest::Error) -> Self {
        if error.is_connect() {
            UpstreamError::Connect
        } else {
            UpstreamError::Request
        }
    }
}

/// What the upstream answered, relayed to the caller untouched.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// Client bound to the single configured upstream endpoint.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("url", &"[redacted]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl UpstreamClient {
    /// Build a client for the configured upstream.
    ///
    /// Returns `Ok(None)` when no provider key is configured.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> AppResult<Option<Self>> {
        let Some(url) = config.upstream_url() else {
            return Ok(None);
        };

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("rpc_gate/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true)
            .build()
            .map_err(|_| AppError::Config("failed to build upstream HTTP client".to_string()))?;

        Ok(Some(Self {
            client,
            url,
            timeout: config.upstream_timeout,
        }))
    }

    /// POST `body` (already validated JSON) to the upstream.
    ///
    /// # Errors
    ///
    /// - `UpstreamError::Timeout` if the whole exchange exceeds the deadline
    /// - any other variant for transport or body-read failures
    pub async fn forward(&self, body: String) -> Result<UpstreamReply, UpstreamError> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.exchange(body)).await;
        let elapsed = started.elapsed();

        let outcome = match result {
            Ok(reply) => reply,
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Upstream call timed out");
                Err(UpstreamError::Timeout(self.timeout))
            }
        };

        let label = match &outcome {
            Ok(reply) => reply.status.as_str().to_string(),
            Err(e) => e.category().to_string(),
        };
        metrics::record_upstream_duration(&label, elapsed.as_secs_f64());

        outcome
    }

    async fn exchange(&self, body: String) -> Result<UpstreamReply, UpstreamError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let err = UpstreamError::from_send(&e);
                debug!(error = %e.without_url(), category = err.category(), "Upstream send failed");
                err
            })?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();

        let body = response.bytes().await.map_err(|e| {
            debug!(error = %e.without_url(), "Upstream body read failed");
            UpstreamError::Body
        })?;

        debug!(status = status.as_u16(), bytes = body.len(), "Upstream answered");

        Ok(UpstreamReply {
            status,
            content_type,
            body,
        })
    }
}
