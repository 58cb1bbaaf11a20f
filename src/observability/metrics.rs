//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, version
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_transformations_total` (counter): by direction, outcome
//! - `gateway_transformation_duration_seconds` (histogram): by direction
//! - `gateway_expression_cache_size` (gauge): compiled programs held
//! - `gateway_expression_cache_events_total` (counter): hit, miss, expired, evicted
//! - `gateway_config_loads_total` (counter): by source (cache, store, default)
//!
//! # Design Decisions
//! - Recording without an installed exporter is a cheap no-op, so unit
//!   tests never need to set one up
//! - Label values are low-cardinality: versions come from the active
//!   configuration, unknown ones are folded to "unsupported"

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus metrics exporter listening"),
        Err(e) => tracing::warn!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, version: &str, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "version" => version.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_transformation(direction: &'static str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!("gateway_transformations_total", "direction" => direction, "outcome" => outcome).increment(1);
    metrics::histogram!("gateway_transformation_duration_seconds", "direction" => direction)
        .record(elapsed.as_secs_f64());
}

pub fn record_cache_event(event: &'static str) {
    metrics::counter!("gateway_expression_cache_events_total", "event" => event).increment(1);
}

pub fn record_cache_size(size: usize) {
    metrics::gauge!("gateway_expression_cache_size").set(size as f64);
}

pub fn record_config_load(source: &'static str) {
    metrics::counter!("gateway_config_loads_total", "source" => source).increment(1);
}
