//! # rpc_gate
//!
//! A small reverse proxy that keeps a metered JSON-RPC provider key out of
//! the browser. Front-ends POST JSON-RPC to the gate; the gate admits,
//! validates and forwards it to the keyed upstream, then relays the answer.
//!
//! - **Admission**: body ceiling, per-client fixed-window rate limit
//! - **Validation**: JSON-RPC 2.0 shape and a read-only method whitelist
//! - **Upstream**: single keyed endpoint, hard timeout, sanitised failures
//! - **Observability**: request IDs, structured logging, Prometheus metrics
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Layers (Request ID → Trace → Baseline headers → CORS)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  rpc_gate: config → size → rate limit → parse → whitelist   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UpstreamClient (reqwest, hard timeout)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  JSON-RPC provider ({UPSTREAM_BASE_URL}/{ALCHEMY_API_KEY})  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rpc_gate::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config)?;
//!     let app = build_router(state);
//!
//!     // Start the server...
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```bash
//! ALCHEMY_API_KEY=... RATE_LIMIT_MAX_REQUESTS=120 cargo run
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod upstream;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
