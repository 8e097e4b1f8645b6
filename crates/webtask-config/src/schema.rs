//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};

/// Spec resolver configuration section.
///
/// Bounds the remote fetch of `http(s)://` middleware specs.
///
/// # Example
///
/// ```
/// use webtask_config::ResolverConfig;
///
/// let config = ResolverConfig {
///     fetch_timeout_ms: 2000,
///     max_redirects: 5,
/// };
/// assert_eq!(config, ResolverConfig::default());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ResolverConfig {
    /// Wall-clock limit for one remote fetch, in milliseconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,

    /// Maximum number of redirects followed by a remote fetch.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    2000
}

fn default_max_redirects() -> usize {
    5
}

/// Key-set configuration section for the JWT strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JwksConfig {
    /// Maximum key-set fetches per rolling minute.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// How long a fetched key stays cached, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Timeout for discovery and key-set requests, in milliseconds.
    #[serde(default = "default_fetch_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            cache_ttl_secs: default_cache_ttl(),
            request_timeout_ms: default_fetch_timeout(),
        }
    }
}

fn default_requests_per_minute() -> u32 {
    5
}

fn default_cache_ttl() -> u64 {
    600
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON, one object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Whether logging is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g. "info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Whether to emit ANSI colors in pretty output.
    #[serde(default)]
    pub ansi_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
            ansi_enabled: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Metrics configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Whether to install the Prometheus recorder.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsSection,
}

impl TelemetrySection {
    /// Converts the logging section into a subscriber configuration.
    #[must_use]
    pub fn log_config(&self) -> webtask_telemetry::LogConfig {
        let base = match self.logging.format {
            LogFormat::Json => webtask_telemetry::LogConfig::production(),
            LogFormat::Pretty => webtask_telemetry::LogConfig::development(),
        };
        webtask_telemetry::LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            ansi: self.logging.ansi_enabled,
            ..base
        }
    }

    /// Converts the metrics section into a recorder configuration.
    #[must_use]
    pub fn metrics_config(&self) -> webtask_telemetry::MetricsConfig {
        webtask_telemetry::MetricsConfig {
            enabled: self.metrics.enabled,
        }
    }
}
