//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mirror_requests_total` (counter): requests by route class and status
//! - `mirror_request_duration_seconds` (histogram): time to response headers
//! - `mirror_rate_limited_total` (counter): rejected requests by class
//! - `mirror_cache_lookups_total` (counter): lookups by class and result
//! - `mirror_cache_entries` (gauge): cached paths
//! - `mirror_transfers_aborted_total` (counter): bodies dropped by the client
//! - `mirror_tls_handshake_failures_total` (counter)
//!
//! All recorders are no-ops until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use tokio::time::Instant;

/// Install the Prometheus recorder and its HTTP scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(class: &str, status: u16, start: Instant) {
    ::metrics::counter!(
        "mirror_requests_total",
        "class" => class.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!("mirror_request_duration_seconds", "class" => class.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(class: &str) {
    ::metrics::counter!("mirror_rate_limited_total", "class" => class.to_string()).increment(1);
}

pub fn record_cache_lookup(class: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    ::metrics::counter!(
        "mirror_cache_lookups_total",
        "class" => class.to_string(),
        "result" => result
    )
    .increment(1);
}

pub fn set_cache_entries(count: usize) {
    ::metrics::gauge!("mirror_cache_entries").set(count as f64);
}

pub fn record_transfer_aborted(class: &str) {
    ::metrics::counter!("mirror_transfers_aborted_total", "class" => class.to_string())
        .increment(1);
}

pub fn record_tls_handshake_failure() {
    ::metrics::counter!("mirror_tls_handshake_failures_total").increment(1);
}
