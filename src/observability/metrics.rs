//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rpc_calls_total` (counter): logical calls by method, outcome
//! - `rpc_call_duration_seconds` (histogram): logical call latency by method
//! - `rpc_attempts_total` (counter): retry attempts by method, outcome
//! - `rpc_rate_limited_total` (counter): admission rejections by scope
//!   (`instance` or `method`)
//! - `rpc_open_circuits` (gauge): breakers currently open, per method
//! - `rpc_live_instances` (gauge): live cache entries per method
//! - `rpc_connections_released_total` (counter): released handles per method

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(method: &str, outcome: &'static str, started: Instant) {
    counter!("rpc_calls_total", "method" => method.to_string(), "outcome" => outcome).increment(1);
    histogram!("rpc_call_duration_seconds", "method" => method.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_attempt(method: &str, outcome: &'static str) {
    counter!("rpc_attempts_total", "method" => method.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_rate_limited(scope: &str) {
    counter!("rpc_rate_limited_total", "scope" => scope.to_string()).increment(1);
}

pub fn record_circuit_opened(method: &str) {
    gauge!("rpc_open_circuits", "method" => method.to_string()).increment(1.0);
}

pub fn record_circuit_closed(method: &str) {
    gauge!("rpc_open_circuits", "method" => method.to_string()).decrement(1.0);
}

pub fn record_live_instances(method: &str, count: usize) {
    gauge!("rpc_live_instances", "method" => method.to_string()).set(count as f64);
}

pub fn record_connection_released(method: &str) {
    counter!("rpc_connections_released_total", "method" => method.to_string()).increment(1);
}
