//! Metrics collection and exposition.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Initialize metrics exporter and server.
pub fn init_metrics(addr: SocketAddr) {
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        tracing::error!(error = %e, "failed to install Prometheus recorder");
        return;
    }
    tracing::info!("Metrics server listening on http://{}", addr);
}

/// Helper to record a discovery request.
pub fn record_discovery(resource_type: &str, status: u16, duration: Instant) {
    let labels = [
        ("type", resource_type.to_string()),
        ("status", status.to_string()),
    ];
    counter!("discovery_requests_total", &labels).increment(1);
    histogram!("discovery_request_duration_seconds", &labels)
        .record(duration.elapsed().as_secs_f64());
}

/// Helper to report the size of the current instance generation.
pub fn record_instance_count(count: usize) {
    gauge!("poller_instances").set(count as f64);
}

/// Helper to report the current generation number.
pub fn record_generation(generation: u64) {
    gauge!("poller_generation").set(generation as f64);
}
