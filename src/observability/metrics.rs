//! Metrics collection and exposition.
//!
//! # Metrics
//! - `admission_decisions_total` (counter): decisions by category, outcome
//! - `admission_tracked_keys` (gauge): live counter entries
//! - `admission_evicted_keys_total` (counter): keys removed by the janitor
//! - `gateway_upstream_requests_total` (counter): forwarded requests by status
//!
//! # Design Decisions
//! - `metrics` facade: recording is a no-op until an exporter is installed
//! - Prometheus exporter serves its own HTTP listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::security::classifier::Category;
use crate::security::window::Decision;

/// Install the Prometheus exporter on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_decision(category: Category, decision: Decision) {
    let outcome = match decision {
        Decision::Admit => "admitted",
        Decision::Reject => "rejected",
    };
    metrics::counter!(
        "admission_decisions_total",
        "category" => category.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_tracked_keys(count: usize) {
    metrics::gauge!("admission_tracked_keys").set(count as f64);
}

pub fn record_evicted(count: usize) {
    metrics::counter!("admission_evicted_keys_total").increment(count as u64);
}

pub fn record_upstream(status: u16) {
    metrics::counter!("gateway_upstream_requests_total", "status" => status.to_string())
        .increment(1);
}
