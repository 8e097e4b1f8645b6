//! Engine metrics.
//!
//! Recording goes through the `metrics` facade, so the functions here are
//! cheap no-ops until a recorder is installed. [`init_metrics`] installs a
//! Prometheus recorder whose output is available from [`render_metrics`].

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names.
pub mod names {
    /// Pipeline invocations, labelled by response status.
    pub const PIPELINE_REQUESTS: &str = "webtask_pipeline_requests_total";
    /// Pipeline latency.
    pub const PIPELINE_DURATION: &str = "webtask_pipeline_duration_seconds";
    /// Middleware spec resolutions, labelled by spec kind and outcome.
    pub const RESOLUTIONS: &str = "webtask_middleware_resolutions_total";
    /// Auth strategy verdicts.
    pub const AUTH_DECISIONS: &str = "webtask_auth_decisions_total";
    /// Key-set fetch attempts.
    pub const JWKS_FETCHES: &str = "webtask_jwks_fetches_total";
}

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus recorder.
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Installs the global Prometheus recorder.
///
/// Installing twice is an error; disabled configurations are a no-op.
///
/// # Errors
///
/// Returns `TelemetryError::RecorderInstalled` if a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::RecorderInstalled(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();

    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(names::PIPELINE_REQUESTS, "Total pipeline invocations");
    describe_histogram!(names::PIPELINE_DURATION, "Pipeline duration in seconds");
    describe_counter!(names::RESOLUTIONS, "Middleware spec resolutions by outcome");
    describe_counter!(names::AUTH_DECISIONS, "Auth strategy decisions by outcome");
    describe_counter!(names::JWKS_FETCHES, "JWKS fetch attempts by outcome");
}

/// Records a completed pipeline invocation.
pub fn record_pipeline_request(status_code: u16, duration: Duration) {
    counter!(names::PIPELINE_REQUESTS, "status" => status_code.to_string()).increment(1);
    histogram!(names::PIPELINE_DURATION).record(duration.as_secs_f64());
}

/// Records a middleware spec resolution.
///
/// `kind` is the spec variant ("inline", "named", "remote").
pub fn record_resolution(kind: &'static str, success: bool) {
    let outcome = if success { "ok" } else { "error" };
    counter!(names::RESOLUTIONS, "kind" => kind, "outcome" => outcome).increment(1);
}

/// Records an auth strategy decision.
pub fn record_auth_decision(strategy: &'static str, allowed: bool) {
    let outcome = if allowed { "allow" } else { "deny" };
    counter!(names::AUTH_DECISIONS, "strategy" => strategy, "outcome" => outcome).increment(1);
}

/// Records a key-set fetch attempt.
///
/// `outcome` is one of "ok", "error" or "rate_limited".
pub fn record_jwks_fetch(outcome: &'static str) {
    counter!(names::JWKS_FETCHES, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_dont_panic_without_recorder() {
        record_pipeline_request(200, Duration::from_millis(3));
        record_resolution("named", true);
        record_auth_decision("bearer", false);
        record_jwks_fetch("rate_limited");
    }

    #[test]
    fn test_local_recorder_captures_counters() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_resolution("remote", false);
            record_auth_decision("jwt", true);
        });

        let rendered = handle.render();
        assert!(rendered.contains(names::RESOLUTIONS));
        assert!(rendered.contains("kind=\"remote\""));
        assert!(rendered.contains(names::AUTH_DECISIONS));
    }

    #[test]
    fn test_disabled_metrics_is_noop() {
        assert!(init_metrics(&MetricsConfig { enabled: false }).is_ok());
    }
}
