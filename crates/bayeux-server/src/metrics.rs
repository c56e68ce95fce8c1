//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use bayeux_core::EngineStats;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "bayeux_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "bayeux_connections_active";
    pub const MESSAGES_TOTAL: &str = "bayeux_messages_total";
    pub const MESSAGES_BYTES: &str = "bayeux_messages_bytes";
    pub const EVENTS_TOTAL: &str = "bayeux_events_total";
    pub const CLIENTS_ACTIVE: &str = "bayeux_clients_active";
    pub const CHANNELS_ACTIVE: &str = "bayeux_channels_active";
    pub const SUBSCRIPTIONS_ACTIVE: &str = "bayeux_subscriptions_active";
    pub const LATENCY_SECONDS: &str = "bayeux_latency_seconds";
    pub const ERRORS_TOTAL: &str = "bayeux_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of transport connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open socket transports"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of batches processed");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of batches processed");
    metrics::describe_counter!(names::EVENTS_TOTAL, "Engine lifecycle events by name");
    metrics::describe_gauge!(names::CLIENTS_ACTIVE, "Current number of live clients");
    metrics::describe_gauge!(
        names::CHANNELS_ACTIVE,
        "Current number of channels with subscribers"
    );
    metrics::describe_gauge!(
        names::SUBSCRIPTIONS_ACTIVE,
        "Current number of subscriptions"
    );
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Batch processing latency in seconds"
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

/// Record a new socket connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a socket disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a batch.
pub fn record_message(bytes: usize, direction: &str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction.to_string()).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction.to_string()).increment(bytes as u64);
}

/// Record batch processing latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

/// Record a lifecycle event.
pub fn record_event(name: &'static str) {
    counter!(names::EVENTS_TOTAL, "event" => name).increment(1);
}

/// Update engine gauges.
pub fn set_engine_stats(stats: &EngineStats) {
    gauge!(names::CLIENTS_ACTIVE).set(stats.backend.clients as f64);
    gauge!(names::CHANNELS_ACTIVE).set(stats.backend.channels as f64);
    gauge!(names::SUBSCRIPTIONS_ACTIVE).set(stats.backend.subscriptions as f64);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_guard() {
        // No recorder installed; recording is a no-op.
        let _guard = ConnectionMetricsGuard::new();
    }

    #[test]
    fn test_record_without_recorder() {
        record_event("handshake");
        set_engine_stats(&EngineStats::default());
        record_message(42, "inbound");
    }
}
