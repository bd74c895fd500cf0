//! Metrics collection and export for Parley.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use anyhow::Result;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const MESSAGES_POSTED_TOTAL: &str = "parley_messages_posted_total";
    pub const HISTORY_REQUESTS_TOTAL: &str = "parley_history_requests_total";
    pub const LIVE_SUBSCRIBERS_ACTIVE: &str = "parley_live_subscribers_active";
    pub const LIVE_BATCHES_TOTAL: &str = "parley_live_batches_total";
    pub const LIVE_BATCH_SIZE: &str = "parley_live_batch_size";
    pub const LIVE_MESSAGES_DROPPED: &str = "parley_live_messages_dropped";
    pub const CHANNELS_REGISTERED: &str = "parley_channels_registered";
    pub const ERRORS_TOTAL: &str = "parley_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::MESSAGES_POSTED_TOTAL, "Total number of posted messages");
    metrics::describe_counter!(
        names::HISTORY_REQUESTS_TOTAL,
        "Total number of history page requests"
    );
    metrics::describe_gauge!(
        names::LIVE_SUBSCRIBERS_ACTIVE,
        "Current number of live subscriptions"
    );
    metrics::describe_counter!(names::LIVE_BATCHES_TOTAL, "Total number of delivered live batches");
    metrics::describe_histogram!(names::LIVE_BATCH_SIZE, "Messages per delivered live batch");
    metrics::describe_gauge!(
        names::LIVE_MESSAGES_DROPPED,
        "Messages skipped by lagging live subscribers since start"
    );
    metrics::describe_gauge!(names::CHANNELS_REGISTERED, "Number of registered channels");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a posted message.
pub fn record_post() {
    counter!(names::MESSAGES_POSTED_TOTAL).increment(1);
}

/// Record a history request.
pub fn record_history_request() {
    counter!(names::HISTORY_REQUESTS_TOTAL).increment(1);
}

/// Record a live batch sent to a subscriber.
pub fn record_batch(size: usize) {
    counter!(names::LIVE_BATCHES_TOTAL).increment(1);
    histogram!(names::LIVE_BATCH_SIZE).record(size as f64);
}

/// Update the dropped live message count.
pub fn set_dropped(dropped: u64) {
    gauge!(names::LIVE_MESSAGES_DROPPED).set(dropped as f64);
}

/// Update the registered channel count.
pub fn set_channels(count: usize) {
    gauge!(names::CHANNELS_REGISTERED).set(count as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Tracks one live subscription for as long as it is held.
pub struct SubscriberMetricsGuard;

impl SubscriberMetricsGuard {
    /// Create a new guard, counting one more subscriber.
    #[must_use]
    pub fn new() -> Self {
        gauge!(names::LIVE_SUBSCRIBERS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for SubscriberMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SubscriberMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::LIVE_SUBSCRIBERS_ACTIVE).decrement(1.0);
    }
}
