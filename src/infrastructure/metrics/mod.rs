//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - HTTP request counts and latency for the UI bridge
//! - Realtime channel connectivity and event throughput
//! - Media session state transitions and received RTP bytes
//! - Alert sink activity
//! - Backend REST call latency

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::error;

const NAMESPACE: &str = "senior_safe";

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// HTTP request counter - tracks total requests by method, path, and status code
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
        &["method", "path", "status"],
    )
    .expect("Failed to create HTTP_REQUESTS_TOTAL metric")
});

/// HTTP request latency histogram - tracks request duration in seconds
pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
    HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency in seconds",
        )
        .namespace(NAMESPACE)
        .buckets(buckets),
        &["method", "path"],
    )
    .expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric")
});

/// 1 while the realtime channel is connected
pub static CHANNEL_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    Gauge::with_opts(
        Opts::new("channel_connected", "Realtime channel connectivity").namespace(NAMESPACE),
    )
    .expect("Failed to create CHANNEL_CONNECTED metric")
});

/// Inbound channel events by name and whether anyone was listening
pub static CHANNEL_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("channel_events_total", "Inbound realtime events").namespace(NAMESPACE),
        &["event", "handled"],
    )
    .expect("Failed to create CHANNEL_EVENTS_TOTAL metric")
});

/// Media session transitions by target state
pub static MEDIA_SESSION_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "media_session_transitions_total",
            "Media session state transitions",
        )
        .namespace(NAMESPACE),
        &["state"],
    )
    .expect("Failed to create MEDIA_SESSION_TRANSITIONS_TOTAL metric")
});

/// RTP payload bytes received from remote tracks
pub static MEDIA_RTP_BYTES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("media_rtp_bytes_total", "Received RTP payload bytes").namespace(NAMESPACE),
        &["kind"],
    )
    .expect("Failed to create MEDIA_RTP_BYTES_TOTAL metric")
});

/// Alerts offered to the sink, by outcome ("recorded", "deduplicated")
pub static ALERTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("alerts_total", "Alerts offered to the sink").namespace(NAMESPACE),
        &["outcome"],
    )
    .expect("Failed to create ALERTS_TOTAL metric")
});

/// Backend REST call duration histogram
pub static BACKEND_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
    HistogramVec::new(
        HistogramOpts::new(
            "backend_request_duration_seconds",
            "Backend REST call latency in seconds",
        )
        .namespace(NAMESPACE)
        .buckets(buckets),
        &["operation", "status"],
    )
    .expect("Failed to create BACKEND_REQUEST_DURATION_SECONDS metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("Failed to register HTTP_REQUESTS_TOTAL");
    registry
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS");
    registry
        .register(Box::new(CHANNEL_CONNECTED.clone()))
        .expect("Failed to register CHANNEL_CONNECTED");
    registry
        .register(Box::new(CHANNEL_EVENTS_TOTAL.clone()))
        .expect("Failed to register CHANNEL_EVENTS_TOTAL");
    registry
        .register(Box::new(MEDIA_SESSION_TRANSITIONS_TOTAL.clone()))
        .expect("Failed to register MEDIA_SESSION_TRANSITIONS_TOTAL");
    registry
        .register(Box::new(MEDIA_RTP_BYTES_TOTAL.clone()))
        .expect("Failed to register MEDIA_RTP_BYTES_TOTAL");
    registry
        .register(Box::new(ALERTS_TOTAL.clone()))
        .expect("Failed to register ALERTS_TOTAL");
    registry
        .register(Box::new(BACKEND_REQUEST_DURATION_SECONDS.clone()))
        .expect("Failed to register BACKEND_REQUEST_DURATION_SECONDS");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record HTTP request metrics
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

pub fn set_channel_connected(connected: bool) {
    CHANNEL_CONNECTED.set(if connected { 1.0 } else { 0.0 });
}

/// Helper to count an inbound channel event
pub fn record_channel_event(event: &str, handlers: usize) {
    let handled = if handlers > 0 { "true" } else { "false" };
    CHANNEL_EVENTS_TOTAL
        .with_label_values(&[event, handled])
        .inc();
}

pub fn record_session_transition(state: &str) {
    MEDIA_SESSION_TRANSITIONS_TOTAL
        .with_label_values(&[state])
        .inc();
}

pub fn record_rtp_bytes(kind: &str, bytes: usize) {
    MEDIA_RTP_BYTES_TOTAL
        .with_label_values(&[kind])
        .inc_by(bytes as u64);
}

pub fn record_alert(recorded: bool) {
    let outcome = if recorded { "recorded" } else { "deduplicated" };
    ALERTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to record backend REST call metrics
pub fn record_backend_request(operation: &str, status: &str, duration_secs: f64) {
    BACKEND_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation, status])
        .observe(duration_secs);
}
