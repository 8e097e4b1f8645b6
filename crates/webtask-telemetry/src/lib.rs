//! Observability for the webtask middleware engine.
//!
//! - **Logging**: structured JSON or pretty logs via `tracing-subscriber`
//! - **Metrics**: counters and histograms via the `metrics` facade, with an
//!   optional Prometheus recorder
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `webtask_pipeline_requests_total` | Counter | `status` | Pipeline invocations |
//! | `webtask_pipeline_duration_seconds` | Histogram | - | Pipeline latency |
//! | `webtask_middleware_resolutions_total` | Counter | `kind`, `outcome` | Spec resolutions |
//! | `webtask_auth_decisions_total` | Counter | `strategy`, `outcome` | Auth strategy verdicts |
//! | `webtask_jwks_fetches_total` | Counter | `outcome` | Key-set fetch attempts |
//!
//! # Example
//!
//! ```rust,ignore
//! use webtask_telemetry::{init_telemetry, LogConfig, MetricsConfig};
//!
//! init_telemetry(&LogConfig::production(), &MetricsConfig::default())?;
//! tracing::info!(request_id = %id, "pipeline started");
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{fields, init_logging, LogConfig};
pub use metrics::{init_metrics, render_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging and metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(log: &LogConfig, metrics: &MetricsConfig) -> TelemetryResult<()> {
    init_logging(log)?;
    init_metrics(metrics)
}
