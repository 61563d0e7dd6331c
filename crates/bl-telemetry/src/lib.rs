//! # Biolink Telemetry
//!
//! Observability for the core processes.
//!
//! ## Components
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber` (pretty for
//!   development, JSON for containers)
//! - **Metrics**: Prometheus counters in a process-wide registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bl_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! let _guard = init_telemetry(&config).expect("Failed to init telemetry");
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `biolink-core` | Service name attached to logs |
//! | `BL_PROCESS_ROLE` | `all` | Process role (api, bot, all) |
//! | `BL_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `BL_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `BL_JSON_LOGS` | `false` (true in containers) | JSON formatted logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, ALT_DETECTIONS, BROADCAST_FAILURES,
    EVENTS_DISPATCHED, EVENTS_PUBLISHED, HANDLER_FAILURES, LISTENER_DROPPED,
    ROLLOUT_MEMBERS_ADDED, ROLLOUT_TICKS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first so start-up logs can already count
    let metrics = register_metrics()?;
    init_logging(config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { _metrics: metrics })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelemetryError::MetricsInit("duplicate".to_string());
        assert!(err.to_string().contains("duplicate"));
    }
}
