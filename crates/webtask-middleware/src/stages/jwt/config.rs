//! JWT strategy settings derived from webtask metadata and secrets.

use crate::context::RequestContext;
use std::collections::HashMap;
use std::fmt;
use webtask_core::{WebtaskError, WebtaskResult};

/// Metadata flag enabling the strategy.
pub const AUTHORIZE_EXECUTION: &str = "wt-authorize-execution";
/// Metadata entry naming the expected issuer.
pub const EXECUTION_ISSUER: &str = "wt-execution-iss";
/// Metadata entry naming the expected audience.
pub const EXECUTION_AUDIENCE: &str = "wt-execution-aud";
/// Metadata entry naming an extra scope that grants execution.
pub const EXECUTION_SCOPE: &str = "wt-execution-scope";
/// Metadata entry selecting the signing algorithm.
pub const EXECUTION_ALGORITHM: &str = "wt-execution-alg";
/// Metadata entry selecting how verification keys are found.
pub const KEY_DISCOVERY: &str = "wt-execution-key-discovery";
/// Secret holding the HS256 shared key.
pub const EXECUTION_SECRET: &str = "wt-execution-secret";

/// Returns `true` when `wt-authorize-execution` is set to anything but
/// an empty string or `"0"`.
#[must_use]
pub fn is_enabled(meta: &HashMap<String, String>) -> bool {
    meta.get(AUTHORIZE_EXECUTION)
        .is_some_and(|flag| !flag.is_empty() && flag != "0")
}

/// Accepted token signing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    /// RSA signature, keys from a JWKS document.
    Rs256,
    /// HMAC with the `wt-execution-secret` secret.
    Hs256,
}

impl SigningAlgorithm {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "RS256" => Some(Self::Rs256),
            "HS256" => Some(Self::Hs256),
            _ => None,
        }
    }

    /// The matching `jsonwebtoken` algorithm.
    #[must_use]
    pub const fn to_jwt(self) -> jsonwebtoken::Algorithm {
        match self {
            Self::Rs256 => jsonwebtoken::Algorithm::RS256,
            Self::Hs256 => jsonwebtoken::Algorithm::HS256,
        }
    }
}

/// Where verification keys come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDiscovery {
    /// JWKS location read from the issuer's OpenID configuration.
    Oidc,
    /// Fixed location: the HS256 secret, or `<issuer>/.well-known/jwks.json`.
    Static,
}

impl KeyDiscovery {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "oidc" => Some(Self::Oidc),
            "static" => Some(Self::Static),
            _ => None,
        }
    }
}

/// Settings of one JWT step, fixed once derived.
#[derive(Clone, PartialEq, Eq)]
pub struct JwtAuthConfig {
    /// Expected `iss` claim; also the base URL for key discovery.
    pub issuer: String,
    /// Expected `aud` claim.
    pub audience: String,
    /// Extra scope that grants execution.
    pub required_scope: Option<String>,
    /// Accepted signing algorithm.
    pub algorithm: SigningAlgorithm,
    /// Key discovery mode.
    pub key_discovery: KeyDiscovery,
    secret: Option<String>,
}

impl JwtAuthConfig {
    /// Derives the settings from the request's metadata and secrets.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the issuer or audience is missing,
    /// the algorithm or discovery mode is unknown, or HS256 is selected
    /// without a `wt-execution-secret` secret.
    pub fn from_context(ctx: &RequestContext) -> WebtaskResult<Self> {
        let required = |key: &str| {
            ctx.meta(key)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    WebtaskError::configuration(format!(
                        "the '{key}' metadata property is required when '{AUTHORIZE_EXECUTION}' is set"
                    ))
                })
        };

        let issuer = required(EXECUTION_ISSUER)?;
        let audience = required(EXECUTION_AUDIENCE)?;
        let required_scope = ctx
            .meta(EXECUTION_SCOPE)
            .filter(|scope| !scope.is_empty())
            .map(str::to_string);

        let algorithm = match ctx.meta(EXECUTION_ALGORITHM) {
            None | Some("") => SigningAlgorithm::Rs256,
            Some(value) => SigningAlgorithm::parse(value).ok_or_else(|| {
                WebtaskError::configuration(format!("unsupported '{EXECUTION_ALGORITHM}' value `{value}`"))
            })?,
        };

        let requested_discovery = match ctx.meta(KEY_DISCOVERY) {
            None | Some("") => None,
            Some(value) => Some(KeyDiscovery::parse(value).ok_or_else(|| {
                WebtaskError::configuration(format!("unsupported '{KEY_DISCOVERY}' value `{value}`"))
            })?),
        };

        let secret = ctx
            .secret(EXECUTION_SECRET)
            .filter(|secret| !secret.is_empty())
            .map(str::to_string);

        let key_discovery = match (algorithm, requested_discovery) {
            (SigningAlgorithm::Hs256, Some(KeyDiscovery::Oidc)) => {
                return Err(WebtaskError::configuration(
                    "HS256 tokens verify against a shared secret; OIDC key discovery does not apply",
                ));
            }
            (SigningAlgorithm::Hs256, _) => {
                if secret.is_none() {
                    return Err(WebtaskError::configuration(format!(
                        "the '{EXECUTION_SECRET}' secret is required for HS256"
                    )));
                }
                KeyDiscovery::Static
            }
            (SigningAlgorithm::Rs256, mode) => mode.unwrap_or(KeyDiscovery::Oidc),
        };

        Ok(Self {
            issuer,
            audience,
            required_scope,
            algorithm,
            key_discovery,
            secret,
        })
    }

    /// The HS256 shared secret.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }
}

impl fmt::Debug for JwtAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtAuthConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("required_scope", &self.required_scope)
            .field("algorithm", &self.algorithm)
            .field("key_discovery", &self.key_discovery)
            .field("secret", &self.secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webtask_core::ErrorKind;

    fn base() -> crate::context::RequestContextBuilder {
        RequestContext::builder()
            .meta(AUTHORIZE_EXECUTION, "1")
            .meta(EXECUTION_ISSUER, "https://issuer.example.com/")
            .meta(EXECUTION_AUDIENCE, "https://api.example.com/")
    }

    #[test]
    fn test_is_enabled() {
        let mut meta = HashMap::new();
        assert!(!is_enabled(&meta));

        for (value, enabled) in [("", false), ("0", false), ("1", true), ("true", true)] {
            meta.insert(AUTHORIZE_EXECUTION.to_string(), value.to_string());
            assert_eq!(is_enabled(&meta), enabled, "{value:?}");
        }
    }

    #[test]
    fn test_defaults() {
        let config = JwtAuthConfig::from_context(&base().build()).unwrap();
        assert_eq!(config.issuer, "https://issuer.example.com/");
        assert_eq!(config.audience, "https://api.example.com/");
        assert_eq!(config.required_scope, None);
        assert_eq!(config.algorithm, SigningAlgorithm::Rs256);
        assert_eq!(config.key_discovery, KeyDiscovery::Oidc);
    }

    #[test]
    fn test_missing_issuer_or_audience() {
        let ctx = RequestContext::builder()
            .meta(AUTHORIZE_EXECUTION, "1")
            .meta(EXECUTION_AUDIENCE, "aud")
            .build();
        let err = JwtAuthConfig::from_context(&ctx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains(EXECUTION_ISSUER));

        let ctx = RequestContext::builder()
            .meta(EXECUTION_ISSUER, "iss")
            .meta(EXECUTION_AUDIENCE, "")
            .build();
        let err = JwtAuthConfig::from_context(&ctx).unwrap_err();
        assert!(err.message().contains(EXECUTION_AUDIENCE));
    }

    #[test]
    fn test_hs256_requires_secret() {
        let err = JwtAuthConfig::from_context(&base().meta(EXECUTION_ALGORITHM, "HS256").build())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let config = JwtAuthConfig::from_context(
            &base()
                .meta(EXECUTION_ALGORITHM, "hs256")
                .secret(EXECUTION_SECRET, "shh")
                .build(),
        )
        .unwrap();
        assert_eq!(config.algorithm, SigningAlgorithm::Hs256);
        assert_eq!(config.key_discovery, KeyDiscovery::Static);
        assert_eq!(config.secret(), Some("shh"));
        assert!(!format!("{config:?}").contains("shh"));
    }

    #[test]
    fn test_rejects_unknown_values() {
        for (key, value) in [(EXECUTION_ALGORITHM, "ES256"), (KEY_DISCOVERY, "magic")] {
            let err = JwtAuthConfig::from_context(&base().meta(key, value).build()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Configuration, "{key}={value}");
        }

        let err = JwtAuthConfig::from_context(
            &base()
                .meta(EXECUTION_ALGORITHM, "HS256")
                .meta(KEY_DISCOVERY, "oidc")
                .secret(EXECUTION_SECRET, "shh")
                .build(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_static_rs256_and_scope() {
        let config = JwtAuthConfig::from_context(
            &base()
                .meta(KEY_DISCOVERY, "static")
                .meta(EXECUTION_SCOPE, "wt:execute")
                .build(),
        )
        .unwrap();
        assert_eq!(config.key_discovery, KeyDiscovery::Static);
        assert_eq!(config.required_scope.as_deref(), Some("wt:execute"));
    }
}
