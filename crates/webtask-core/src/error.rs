//! Error types for the webtask engine.
//!
//! This module provides [`WebtaskError`], the single error type produced by
//! spec resolution, pipeline dispatch and the authorization strategies.
//!
//! Every variant maps to an HTTP status through [`ErrorKind`]. Client-facing
//! rendering (masking of server errors, forwarding of [`ErrorFields`]) is
//! done by the pipeline's error responder, not here.
//!
//! | `ErrorKind` | Status |
//! |---|---|
//! | `Parse` | 500 |
//! | `Resolution` | 500 |
//! | `Fetch` | 500 |
//! | `ContractViolation` | 500 |
//! | `Authentication` | 401 |
//! | `Authorization` | 403 |
//! | `UpstreamDependency` | 502 |
//! | `Serialization` | 500 |
//! | `Configuration` | 500 |
//! | `Internal` | 500 |
//! | `Custom` | caller supplied |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`WebtaskError`].
pub type WebtaskResult<T> = Result<T, WebtaskError>;

/// Classification of a [`WebtaskError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed middleware spec text.
    Parse,
    /// Module or export could not be resolved, compiled or instantiated.
    Resolution,
    /// Remote source could not be fetched.
    Fetch,
    /// A value did not honor the middleware or webtask contract.
    ContractViolation,
    /// Missing or invalid credentials.
    Authentication,
    /// Valid credentials without the required scope.
    Authorization,
    /// Discovery or key-set endpoint failed or answered garbage.
    UpstreamDependency,
    /// A webtask result could not be serialized.
    Serialization,
    /// Invalid metadata or missing required settings.
    Configuration,
    /// Unexpected failure, including panics inside a step.
    Internal,
    /// Error raised by a user step with an explicit status.
    Custom,
}

impl ErrorKind {
    /// Returns the default HTTP status code for this kind.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::UpstreamDependency => StatusCode::BAD_GATEWAY,
            Self::Parse
            | Self::Resolution
            | Self::Fetch
            | Self::ContractViolation
            | Self::Serialization
            | Self::Configuration
            | Self::Internal
            | Self::Custom => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Extra properties an error may forward to the client.
///
/// Only these keys survive error normalization, and only for responses
/// whose status is not 500.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorFields {
    /// Machine-readable error code (e.g. `invalid_token`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Numeric or symbolic error number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<serde_json::Value>,

    /// OAuth-style error identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// OAuth-style human readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    /// Arbitrary structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ErrorFields {
    /// Creates an empty set of fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `code` field.
    #[must_use]
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the `errno` field.
    #[must_use]
    pub fn errno(mut self, errno: impl Into<serde_json::Value>) -> Self {
        self.errno = Some(errno.into());
        self
    }

    /// Sets the `error` field.
    #[must_use]
    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Sets the `error_description` field.
    #[must_use]
    pub fn error_description(mut self, description: impl Into<String>) -> Self {
        self.error_description = Some(description.into());
        self
    }

    /// Sets the `data` field.
    #[must_use]
    pub fn data(mut self, data: impl Into<serde_json::Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_none()
            && self.errno.is_none()
            && self.error.is_none()
            && self.error_description.is_none()
            && self.data.is_none()
    }
}

/// Standard error type for the webtask engine.
///
/// # Example
///
/// ```
/// use webtask_core::{ErrorFields, WebtaskError};
///
/// let err = WebtaskError::authentication("jwt expired")
///     .with_fields(ErrorFields::new().code("invalid_token"));
///
/// assert_eq!(err.status_code().as_u16(), 401);
/// assert_eq!(err.message(), "jwt expired");
/// assert_eq!(err.fields().and_then(|f| f.code.as_deref()), Some("invalid_token"));
/// ```
#[derive(Error, Debug)]
pub enum WebtaskError {
    /// Spec text does not match the middleware reference grammar.
    #[error("invalid middleware spec `{spec}`: {reason}")]
    Parse {
        /// The offending spec text.
        spec: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Module lookup, compilation or factory invocation failed.
    #[error("failed to resolve middleware: {message}")]
    Resolution {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A remote source could not be fetched.
    #[error("failed to fetch `{url}`: {message}")]
    Fetch {
        /// The URL being fetched.
        url: String,
        /// Human-readable error message.
        message: String,
        /// Upstream HTTP status, when one was received.
        status: Option<u16>,
    },

    /// A resolved value does not honor the step or webtask contract.
    #[error("contract violation: {message}")]
    ContractViolation {
        /// Human-readable error message.
        message: String,
    },

    /// Authentication failed.
    #[error("{message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
        /// Forwardable extra fields.
        fields: ErrorFields,
    },

    /// Authorization denied.
    #[error("{message}")]
    Authorization {
        /// Human-readable error message.
        message: String,
        /// Forwardable extra fields.
        fields: ErrorFields,
    },

    /// A discovery or key-set dependency failed.
    #[error("{message}")]
    UpstreamDependency {
        /// Human-readable error message.
        message: String,
        /// Forwardable extra fields.
        fields: ErrorFields,
    },

    /// A value could not be serialized to JSON.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Human-readable error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Human-readable error message.
        message: String,
    },

    /// Internal server error.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Error raised by user code with an explicit status.
    #[error("{message}")]
    Custom {
        /// HTTP status to answer with.
        status: StatusCode,
        /// Human-readable error message.
        message: String,
        /// Forwardable extra fields.
        fields: ErrorFields,
    },
}

impl WebtaskError {
    /// Creates a parse error.
    #[must_use]
    pub fn parse(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    /// Creates a resolution error.
    #[must_use]
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a resolution error with a source error.
    pub fn resolution_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Resolution {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates a fetch error.
    #[must_use]
    pub fn fetch(url: impl Into<String>, message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.into(),
            status,
        }
    }

    /// Creates a contract violation.
    #[must_use]
    pub fn contract_violation(message: impl Into<String>) -> Self {
        Self::ContractViolation {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            fields: ErrorFields::default(),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
            fields: ErrorFields::default(),
        }
    }

    /// Creates an upstream dependency error.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamDependency {
            message: message.into(),
            fields: ErrorFields::default(),
        }
    }

    /// Creates a serialization error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an error with an explicit status, as raised by user steps.
    #[must_use]
    pub fn custom(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Custom {
            status,
            message: message.into(),
            fields: ErrorFields::default(),
        }
    }

    /// Attaches forwardable fields.
    ///
    /// Variants that never forward fields ignore the call.
    #[must_use]
    pub fn with_fields(mut self, new_fields: ErrorFields) -> Self {
        match &mut self {
            Self::Authentication { fields, .. }
            | Self::Authorization { fields, .. }
            | Self::UpstreamDependency { fields, .. }
            | Self::Custom { fields, .. } => *fields = new_fields,
            _ => {}
        }
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Resolution { .. } => ErrorKind::Resolution,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::ContractViolation { .. } => ErrorKind::ContractViolation,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::UpstreamDependency { .. } => ErrorKind::UpstreamDependency,
            Self::Serialization { .. } => ErrorKind::Serialization,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::Custom { .. } => ErrorKind::Custom,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Custom { status, .. } => *status,
            other => other.kind().default_status_code(),
        }
    }

    /// Returns the bare message, without the kind prefix used by `Display`.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Parse { reason, .. } => reason,
            Self::Resolution { message, .. }
            | Self::Fetch { message, .. }
            | Self::ContractViolation { message }
            | Self::Authentication { message, .. }
            | Self::Authorization { message, .. }
            | Self::UpstreamDependency { message, .. }
            | Self::Serialization { message }
            | Self::Configuration { message }
            | Self::Internal { message, .. }
            | Self::Custom { message, .. } => message,
        }
    }

    /// Returns the forwardable fields, if this variant carries any.
    #[must_use]
    pub fn fields(&self) -> Option<&ErrorFields> {
        match self {
            Self::Authentication { fields, .. }
            | Self::Authorization { fields, .. }
            | Self::UpstreamDependency { fields, .. }
            | Self::Custom { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Returns `true` if this error is answered with a server status.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}
