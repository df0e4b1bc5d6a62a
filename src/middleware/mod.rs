//! HTTP middleware and admission helpers for the gate.
//!
//! - **CORS**: Origin echo and `Vary: Origin` on every response
//! - **Request ID**: generation and propagation for log correlation
//! - **Client identity**: `X-Forwarded-For` / socket peer resolution with
//!   optional trusted-proxy validation
//! - **Rate limiting**: per-client fixed-window counter
//!
//! # Architecture
//!
//! ```text
//! Request → Request ID → Trace → Baseline headers → CORS → Gate handler
//!                                                           │
//!                                      client_identity ─────┤
//!                                   FixedWindowLimiter ─────┘ 429
//! ```
//!
//! The limiter runs inside the handler rather than as a layer because it
//! must come after the configuration and body-size checks.

pub mod cors;
pub mod ip;
pub mod rate_limit;
pub mod request_id;

pub use cors::{CorsPolicy, cors_middleware};
pub use ip::{TrustedProxyConfig, UNKNOWN_IP, client_identity};
pub use rate_limit::{FixedWindowLimiter, RateLimitDecision, retry_after_secs};
pub use request_id::{RequestIdExt, RequestIdLayer};
