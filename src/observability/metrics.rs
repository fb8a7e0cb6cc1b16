//! Metrics collection and exposition.
//!
//! # Metrics
//! - `connectivity_state` (gauge): 0=unknown, 1=online, 2=offline
//! - `connectivity_state_changes_total` (counter): transitions by target state
//! - `connectivity_stream_failures_total` (counter): reported stream failures
//! - `connectivity_offline_warnings_total` (counter): operator warnings emitted
//!
//! Recording without an installed recorder is a no-op.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::connectivity::ConnectivityState;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_state_change(state: ConnectivityState) {
    metrics::gauge!("connectivity_state").set(state as u8 as f64);
    metrics::counter!("connectivity_state_changes_total", "state" => state.as_str()).increment(1);
}

pub fn record_stream_failure() {
    metrics::counter!("connectivity_stream_failures_total").increment(1);
}

pub fn record_offline_warning() {
    metrics::counter!("connectivity_offline_warnings_total").increment(1);
}
