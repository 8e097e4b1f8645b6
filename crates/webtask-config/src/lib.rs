//! Typed configuration for the webtask middleware engine.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use webtask_config::ConfigLoader;
//!
//! # fn main() -> Result<(), webtask_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_file("webtask.toml")?
//!     .with_env_prefix("WEBTASK")
//!     .load()?;
//!
//! println!("remote specs time out after {}ms", config.resolver.fetch_timeout_ms);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [resolver]
//! fetch_timeout_ms = 2000
//! max_redirects = 5
//!
//! [jwks]
//! requests_per_minute = 5
//! cache_ttl_secs = 600
//! request_timeout_ms = 2000
//!
//! [telemetry.logging]
//! enabled = true
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = true
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Field |
//! |---|---|
//! | `WEBTASK__RESOLVER__FETCH_TIMEOUT_MS` | `resolver.fetch_timeout_ms` |
//! | `WEBTASK__RESOLVER__MAX_REDIRECTS` | `resolver.max_redirects` |
//! | `WEBTASK__JWKS__REQUESTS_PER_MINUTE` | `jwks.requests_per_minute` |
//! | `WEBTASK__JWKS__CACHE_TTL_SECS` | `jwks.cache_ttl_secs` |
//! | `WEBTASK__JWKS__REQUEST_TIMEOUT_MS` | `jwks.request_timeout_ms` |
//! | `WEBTASK__TELEMETRY__LOGGING__LEVEL` | `telemetry.logging.level` |
//! | `WEBTASK__TELEMETRY__LOGGING__FORMAT` | `telemetry.logging.format` |
//! | `WEBTASK__TELEMETRY__METRICS__ENABLED` | `telemetry.metrics.enabled` |

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::EngineConfig;
pub use error::{ConfigError, Section};
pub use loader::ConfigLoader;
pub use schema::{
    JwksConfig, LogFormat, LoggingConfig, MetricsSection, ResolverConfig, TelemetrySection,
};
