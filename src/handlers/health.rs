//! Health payload served on `GET`.
//!
//! Always 200. It does not probe the upstream and is answered even when no
//! provider key is configured, so it only proves the process is up.
//!
//! ```json
//! {"ok":true,"service":"UluwatuSwap RPC proxy","chain":"arbitrum-42161"}
//! ```

use axum::http::StatusCode;
use axum::response::Response;

use super::util::json_response;
use crate::metrics;
use crate::models::HealthResponse;
use crate::state::AppState;

pub fn health(state: &AppState) -> Response {
    metrics::record_request_outcome("health");
    json_response(
        StatusCode::OK,
        &HealthResponse::new(&state.config.service_name, &state.config.chain_label),
    )
}
