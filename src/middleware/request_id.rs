//! Request ID propagation.
//!
//! Every request leaves with an `X-Request-Id`. A caller-supplied value is
//! kept (so a front-end can correlate its own logs); otherwise a UUIDv4 is
//! minted. The ID is written back into the request headers before the trace
//! span is opened, so the span and the handler's log lines both carry it.
//!
//! ```bash
//! curl -H "X-Request-Id: swap-quote-42" http://localhost:3000/api/rpc
//! ```

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::HeaderValue;
use axum::http::{Request, Response};
use tower::{Layer, Service};
use tracing::trace;
use uuid::Uuid;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest caller-supplied ID kept verbatim; longer ones are replaced.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Tower layer attaching [`RequestIdService`].
#[derive(Clone, Default)]
pub struct RequestIdLayer;

impl RequestIdLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestIdService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let request_id = incoming_or_new_request_id(&req);

        trace!(request_id = ?request_id, "Request ID assigned");
        req.headers_mut().insert(REQUEST_ID_HEADER, request_id.clone());

        // Keep the ready service in `self` and drive the clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let mut response = inner.call(req).await?;
            response.headers_mut().insert(REQUEST_ID_HEADER, request_id);
            Ok(response)
        })
    }
}

/// Reuse a sane caller-supplied ID or mint a UUIDv4.
fn incoming_or_new_request_id<B>(req: &Request<B>) -> HeaderValue {
    if let Some(value) = req.headers().get(REQUEST_ID_HEADER)
        && let Ok(text) = value.to_str()
        && !text.is_empty()
        && text.len() <= MAX_REQUEST_ID_LEN
    {
        return value.clone();
    }

    // A hyphenated UUID is always a valid header value.
    HeaderValue::from_str(&Uuid::new_v4().to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
}

/// Read the request ID assigned by [`RequestIdLayer`].
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
    }
}
