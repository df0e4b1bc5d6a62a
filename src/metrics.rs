//! Prometheus metrics for the gate.
//!
//! Metrics are exposed via a dedicated HTTP listener (default port 9090).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `rpc_gate_requests_total` - Gate decisions (label: outcome)
//! - `rpc_gate_forwarded_calls_total` - JSON-RPC calls forwarded (label: method)
//!
//! ## Histograms
//! - `rpc_gate_upstream_duration_seconds` - Upstream exchange duration (label: status)
//!
//! ## Gauges
//! - `rpc_gate_tracked_clients` - Keys currently held by the rate limiter
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter, so
//! tests and metrics-disabled deployments pay nothing.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "rpc_gate_requests_total";
    pub const FORWARDED_CALLS_TOTAL: &str = "rpc_gate_forwarded_calls_total";
    pub const UPSTREAM_DURATION_SECONDS: &str = "rpc_gate_upstream_duration_seconds";
    pub const TRACKED_CLIENTS: &str = "rpc_gate_tracked_clients";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (port in use,
/// recorder already set).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::REQUESTS_TOTAL,
        "Requests handled by the gate, by outcome"
    );
    describe_counter!(
        names::FORWARDED_CALLS_TOTAL,
        "JSON-RPC calls forwarded upstream, by method"
    );
    describe_histogram!(
        names::UPSTREAM_DURATION_SECONDS,
        "Upstream exchange duration in seconds"
    );
    describe_gauge!(
        names::TRACKED_CLIENTS,
        "Client keys currently tracked by the rate limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record one gate decision (`forwarded`, `rate_limited`, `health`, ...).
pub fn record_request_outcome(outcome: &'static str) {
    counter!(names::REQUESTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a forwarded call. Only whitelisted names reach this, so the
/// label set stays bounded.
pub fn record_forwarded_call(method: &str) {
    counter!(names::FORWARDED_CALLS_TOTAL, "method" => method.to_string()).increment(1);
}

/// Record the duration of one upstream exchange.
pub fn record_upstream_duration(status: &str, duration_secs: f64) {
    histogram!(names::UPSTREAM_DURATION_SECONDS, "status" => status.to_string())
        .record(duration_secs);
}

/// Update the tracked-clients gauge.
pub fn set_tracked_clients(count: usize) {
    gauge!(names::TRACKED_CLIENTS).set(count as f64);
}
