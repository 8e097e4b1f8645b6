//! Configuration error types.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level section of [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// `[resolver]`: remote middleware fetching.
    Resolver,
    /// `[jwks]`: signing-key retrieval for the JWT strategies.
    Jwks,
    /// `[telemetry]`: logging and metrics.
    Telemetry,
}

impl Section {
    /// Name of the section as written in files and env overrides.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Resolver => "resolver",
            Self::Jwks => "jwks",
            Self::Telemetry => "telemetry",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while loading the engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("engine configuration file not found: {path}")]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// The configuration file exists but could not be read.
    #[error("failed to read engine configuration file: {path}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax error or unknown key.
    #[error("invalid TOML engine configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax error or unknown key.
    #[error("invalid JSON engine configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Neither TOML nor JSON.
    #[error("unsupported engine configuration format `{format}` (expected toml or json)")]
    UnsupportedFormat {
        /// The rejected format or file name.
        format: String,
    },

    /// A value parsed but breaks a constraint of its section.
    #[error("invalid `{section}.{key}`: {reason}")]
    InvalidValue {
        /// Section holding the value.
        section: Section,
        /// Key within the section.
        key: &'static str,
        /// Constraint that was broken.
        reason: &'static str,
    },

    /// A `PREFIX__SECTION__KEY` variable could not be applied.
    #[error("environment override {var} rejected: {reason}")]
    EnvOverride {
        /// Full variable name.
        var: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    /// The file at `path` does not exist.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// The file at `path` could not be read.
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// `format` is neither TOML nor JSON.
    pub fn unsupported_format(format: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// `section.key` breaks a constraint.
    pub fn invalid_value(section: Section, key: &'static str, reason: &'static str) -> Self {
        Self::InvalidValue {
            section,
            key,
            reason,
        }
    }

    /// The override `var` could not be applied.
    pub fn env_override(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvOverride {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Section that failed validation, if the error is about a single value.
    #[must_use]
    pub fn section(&self) -> Option<Section> {
        match self {
            Self::InvalidValue { section, .. } => Some(*section),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_names_section_and_key() {
        let err = ConfigError::invalid_value(Section::Jwks, "requests_per_minute", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "invalid `jwks.requests_per_minute`: must be greater than zero"
        );
        assert_eq!(err.section(), Some(Section::Jwks));
    }

    #[test]
    fn test_env_override_error() {
        let err = ConfigError::env_override("WEBTASK__JWKS__REQUESTS_PER_MINUTE", "expected integer");
        assert!(err.to_string().contains("WEBTASK__JWKS__REQUESTS_PER_MINUTE"));
        assert!(err.to_string().contains("expected integer"));
        assert_eq!(err.section(), None);
    }

    #[test]
    fn test_file_not_found_error() {
        let err = ConfigError::file_not_found("/etc/webtask/engine.toml");
        assert!(err.to_string().contains("/etc/webtask/engine.toml"));
    }
}
