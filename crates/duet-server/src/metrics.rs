//! Metrics collection and export for Duet.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "duet_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "duet_connections_active";
    pub const ROOMS_ACTIVE: &str = "duet_rooms_active";
    pub const ADMISSIONS_TOTAL: &str = "duet_admissions_total";
    pub const REJECTIONS_TOTAL: &str = "duet_rejections_total";
    pub const MESSAGES_TOTAL: &str = "duet_messages_total";
    pub const MESSAGES_BYTES: &str = "duet_messages_bytes";
    pub const MESSAGES_DROPPED: &str = "duet_messages_dropped_total";
    pub const DELIVERIES_SKIPPED: &str = "duet_deliveries_skipped_total";
    pub const LATENCY_SECONDS: &str = "duet_relay_latency_seconds";
    pub const ERRORS_TOTAL: &str = "duet_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of live rooms");
    metrics::describe_counter!(names::ADMISSIONS_TOTAL, "Total number of room admissions");
    metrics::describe_counter!(
        names::REJECTIONS_TOTAL,
        "Total number of refused connections by reason"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of messages relayed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of messages relayed");
    metrics::describe_counter!(
        names::MESSAGES_DROPPED,
        "Inbound messages dropped without relaying, by reason"
    );
    metrics::describe_counter!(
        names::DELIVERIES_SKIPPED,
        "Deliveries skipped because the peer was not ready"
    );
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound message processing latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a successful admission.
pub fn record_admission() {
    counter!(names::ADMISSIONS_TOTAL).increment(1);
}

/// Record a refused connection.
pub fn record_rejection(reason: &'static str) {
    counter!(names::REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

/// Record a relayed message.
pub fn record_message(bytes: usize, recipients: usize) {
    counter!(names::MESSAGES_TOTAL).increment(1);
    counter!(names::MESSAGES_BYTES).increment((bytes * recipients) as u64);
}

/// Record an inbound message that was not relayed.
pub fn record_dropped(reason: &'static str) {
    counter!(names::MESSAGES_DROPPED, "reason" => reason).increment(1);
}

/// Record a delivery skipped because the peer was not ready.
pub fn record_skipped_delivery() {
    counter!(names::DELIVERIES_SKIPPED).increment(1);
}

/// Record message latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Update live room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
