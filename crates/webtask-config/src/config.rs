//! Root configuration type.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, JwksConfig, LogFormat, ResolverConfig, Section, TelemetrySection};

/// Complete engine configuration.
///
/// # Example
///
/// ```
/// use webtask_config::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.resolver.fetch_timeout_ms, 2000);
/// assert_eq!(config.jwks.requests_per_minute, 5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Spec resolver settings.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// JWT key-set settings.
    #[serde(default)]
    pub jwks: JwksConfig,

    /// Logging and metrics settings.
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl EngineConfig {
    /// Development preset: pretty debug logs, metrics off.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.ansi_enabled = true;
        config.telemetry.metrics.enabled = false;
        config
    }

    /// Production preset: JSON info logs, metrics on.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for zero timeouts, a zero key-set
    /// rate or an empty log level.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resolver.fetch_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                Section::Resolver,
                "fetch_timeout_ms",
                "must be greater than zero",
            ));
        }

        if self.jwks.requests_per_minute == 0 {
            return Err(ConfigError::invalid_value(
                Section::Jwks,
                "requests_per_minute",
                "must be greater than zero",
            ));
        }

        if self.jwks.request_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                Section::Jwks,
                "request_timeout_ms",
                "must be greater than zero",
            ));
        }

        if self.telemetry.logging.enabled && self.telemetry.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                Section::Telemetry,
                "logging.level",
                "must not be empty",
            ));
        }

        Ok(())
    }
}
