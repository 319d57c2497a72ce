//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_rate_limited_total` (counter): requests denied by the rate limiter
//! - `gateway_attestation_total` (counter): attestation outcomes by mode
//! - `gateway_usage_events_total` (counter): usage events emitted
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Labels never carry credential ids or destinations
//! - Recording without an installed exporter is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Start the Prometheus scrape listener. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(status: u16, start: Instant) {
    ::metrics::counter!("gateway_requests_total", "status" => status.to_string()).increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    ::metrics::counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_attestation(mode: &'static str, outcome: &'static str) {
    ::metrics::counter!("gateway_attestation_total", "mode" => mode, "outcome" => outcome).increment(1);
}

pub fn record_usage() {
    ::metrics::counter!("gateway_usage_events_total").increment(1);
}
