//! Errors raised while wiring logging and metrics for the webtask engine.

use thiserror::Error;

/// Telemetry setup failures.
///
/// Both globals can be installed only once per process, so a second engine
/// in the same process gets one of the `*Installed` variants.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// `telemetry.logging.level` is not a valid `EnvFilter` directive.
    #[error("invalid log filter `{directive}`: {reason}")]
    InvalidLogFilter {
        /// Directive as configured.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global tracing subscriber was already set.
    #[error("tracing subscriber already installed: {0}")]
    SubscriberInstalled(String),

    /// A global metrics recorder was already set.
    #[error("metrics recorder already installed: {0}")]
    RecorderInstalled(String),
}

impl TelemetryError {
    /// `directive` was rejected by the filter parser.
    pub fn invalid_log_filter(directive: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidLogFilter {
            directive: directive.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_log_filter_names_directive() {
        let err = TelemetryError::invalid_log_filter("webtask=loud", "invalid level");
        assert_eq!(
            err.to_string(),
            "invalid log filter `webtask=loud`: invalid level"
        );
    }

    #[test]
    fn test_installed_errors() {
        let err = TelemetryError::RecorderInstalled("set".to_string());
        assert_eq!(err.to_string(), "metrics recorder already installed: set");

        let err = TelemetryError::SubscriberInstalled("set".to_string());
        assert_eq!(err.to_string(), "tracing subscriber already installed: set");
    }
}
