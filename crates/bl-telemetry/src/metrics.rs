//! Prometheus metrics for the Biolink core.
//!
//! All metrics follow the naming convention: `bl_<component>_<metric>_<unit>`
//!
//! Counters are usable before [`register_metrics`] runs; registration only
//! makes them visible to [`encode_metrics`].

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // EVENT BUS METRICS
    // =========================================================================

    /// Events persisted and published
    pub static ref EVENTS_PUBLISHED: CounterVec = CounterVec::new(
        Opts::new("bl_bus_events_published_total", "Events persisted and published"),
        &["event_type"]
    ).expect("metric creation failed");

    /// Events dispatched to local handlers
    pub static ref EVENTS_DISPATCHED: CounterVec = CounterVec::new(
        Opts::new("bl_bus_events_dispatched_total", "Events dispatched to local handlers"),
        &["path"]  // path: local/remote/replay
    ).expect("metric creation failed");

    /// Handler invocations that did not succeed
    pub static ref HANDLER_FAILURES: CounterVec = CounterVec::new(
        Opts::new("bl_bus_handler_failures_total", "Failed handler invocations"),
        &["kind"]  // kind: error/panic
    ).expect("metric creation failed");

    /// Broadcasts that could not reach the shared channel
    pub static ref BROADCAST_FAILURES: Counter = Counter::new(
        "bl_bus_broadcast_failures_total",
        "Events persisted but not broadcast on the shared channel"
    ).expect("metric creation failed");

    /// Channel messages dropped by the listener (undecodable)
    pub static ref LISTENER_DROPPED: Counter = Counter::new(
        "bl_bus_listener_dropped_total",
        "Channel messages the listener could not decode"
    ).expect("metric creation failed");

    // =========================================================================
    // ROLLOUT METRICS
    // =========================================================================

    /// Users enrolled into experiments
    pub static ref ROLLOUT_MEMBERS_ADDED: CounterVec = CounterVec::new(
        Opts::new("bl_rollout_members_added_total", "Users enrolled into experiments"),
        &["feature_key"]
    ).expect("metric creation failed");

    /// Rollout ticks executed
    pub static ref ROLLOUT_TICKS: Counter = Counter::new(
        "bl_rollout_ticks_total",
        "Periodic rollout ticks executed"
    ).expect("metric creation failed");

    // =========================================================================
    // DETECTOR METRICS
    // =========================================================================

    /// Alt-account detections published
    pub static ref ALT_DETECTIONS: CounterVec = CounterVec::new(
        Opts::new("bl_detector_detections_total", "Alt-account detections published"),
        &["source"]  // source: registration/login/email_verification
    ).expect("metric creation failed");
}

/// Handle for the metrics registry
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Calling this more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Event Bus
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(EVENTS_DISPATCHED.clone()),
        Box::new(HANDLER_FAILURES.clone()),
        Box::new(BROADCAST_FAILURES.clone()),
        Box::new(LISTENER_DROPPED.clone()),
        // Rollout
        Box::new(ROLLOUT_MEMBERS_ADDED.clone()),
        Box::new(ROLLOUT_TICKS.clone()),
        // Detector
        Box::new(ALT_DETECTIONS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
