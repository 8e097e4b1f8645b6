//! Token verification.

use super::config::{JwtAuthConfig, KeyDiscovery, SigningAlgorithm};
use super::discovery::{discover_jwks_uri, issuer_url, STATIC_JWKS_PATH};
use super::keys::JwksKeySet;
use crate::middleware::BoxFuture;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use webtask_config::JwksConfig;
use webtask_core::{ErrorFields, WebtaskError, WebtaskResult};

/// Verified token claims.
pub type Claims = serde_json::Map<String, serde_json::Value>;

/// Checks a bearer token and returns its claims.
///
/// Implementations report failures as 401 `invalid_token` errors carrying
/// one of the stable messages below, or as upstream dependency errors when
/// keys cannot be loaded.
pub trait TokenVerifier: Send + Sync + 'static {
    /// Verifies `token`.
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, WebtaskResult<Claims>>;
}

pub(crate) fn invalid_token(message: &'static str) -> WebtaskError {
    WebtaskError::authentication(message).with_fields(ErrorFields::new().code("invalid_token"))
}

/// Maps a `jsonwebtoken` failure onto the stable client-facing message.
pub(crate) fn map_jwt_error(error: &JwtError) -> WebtaskError {
    let message = match error.kind() {
        JwtErrorKind::ExpiredSignature => "jwt expired",
        JwtErrorKind::ImmatureSignature => "jwt not active",
        JwtErrorKind::InvalidSignature | JwtErrorKind::InvalidRsaKey(_) => "invalid signature",
        JwtErrorKind::InvalidIssuer => "jwt issuer invalid",
        JwtErrorKind::InvalidAudience => "jwt audience invalid",
        JwtErrorKind::InvalidAlgorithm | JwtErrorKind::InvalidAlgorithmName => "invalid algorithm",
        JwtErrorKind::MissingRequiredClaim(_) => "jwt missing required claim",
        _ => "jwt malformed",
    };
    invalid_token(message)
}

enum KeySource {
    Secret(DecodingKey),
    Jwks(JwksKeySet),
}

/// Verifies tokens with `jsonwebtoken` against the configured key source.
pub struct JwtVerifier {
    algorithm: SigningAlgorithm,
    validation: Validation,
    keys: KeySource,
}

impl JwtVerifier {
    /// Builds a verifier for `config`, running OIDC discovery when selected.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid issuer URL or a missing
    /// HS256 secret, and an upstream dependency error when discovery fails.
    pub async fn build(
        config: &JwtAuthConfig,
        http: &reqwest::Client,
        settings: &JwksConfig,
    ) -> WebtaskResult<Self> {
        match (config.algorithm, config.key_discovery) {
            (SigningAlgorithm::Hs256, _) => {
                let secret = config.secret().ok_or_else(|| {
                    WebtaskError::configuration("HS256 requires a shared secret")
                })?;
                Ok(Self::with_secret(&config.issuer, &config.audience, secret))
            }
            (SigningAlgorithm::Rs256, KeyDiscovery::Static) => {
                let jwks_uri = issuer_url(&config.issuer, STATIC_JWKS_PATH)?;
                let keys = JwksKeySet::new(jwks_uri, http.clone(), settings);
                Ok(Self::with_key_set(&config.issuer, &config.audience, keys))
            }
            (SigningAlgorithm::Rs256, KeyDiscovery::Oidc) => {
                let jwks_uri = discover_jwks_uri(http, &config.issuer).await?;
                tracing::info!(issuer = %config.issuer, jwks_uri = %jwks_uri, "Discovered signing keys");
                let keys = JwksKeySet::new(jwks_uri, http.clone(), settings);
                Ok(Self::with_key_set(&config.issuer, &config.audience, keys))
            }
        }
    }

    /// Verifies HS256 tokens against a shared secret.
    #[must_use]
    pub fn with_secret(issuer: &str, audience: &str, secret: &str) -> Self {
        Self::new(
            SigningAlgorithm::Hs256,
            issuer,
            audience,
            KeySource::Secret(DecodingKey::from_secret(secret.as_bytes())),
        )
    }

    /// Verifies RS256 tokens against a remote key set.
    #[must_use]
    pub fn with_key_set(issuer: &str, audience: &str, keys: JwksKeySet) -> Self {
        Self::new(SigningAlgorithm::Rs256, issuer, audience, KeySource::Jwks(keys))
    }

    fn new(algorithm: SigningAlgorithm, issuer: &str, audience: &str, keys: KeySource) -> Self {
        let mut validation = Validation::new(algorithm.to_jwt());
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.leeway = 0;
        validation.validate_nbf = true;

        Self {
            algorithm,
            validation,
            keys,
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, WebtaskResult<Claims>> {
        Box::pin(async move {
            let header = decode_header(token).map_err(|e| map_jwt_error(&e))?;
            if header.alg != self.algorithm.to_jwt() {
                return Err(invalid_token("invalid algorithm"));
            }

            let key = match &self.keys {
                KeySource::Secret(key) => key.clone(),
                KeySource::Jwks(set) => set.key(header.kid.as_deref()).await?,
            };

            decode::<Claims>(token, &key, &self.validation)
                .map(|data| data.claims)
                .map_err(|e| map_jwt_error(&e))
        })
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = match &self.keys {
            KeySource::Secret(_) => "secret",
            KeySource::Jwks(_) => "jwks",
        };
        f.debug_struct("JwtVerifier")
            .field("algorithm", &self.algorithm)
            .field("keys", &keys)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::stages::jwt::config::{
        AUTHORIZE_EXECUTION, EXECUTION_ALGORITHM, EXECUTION_AUDIENCE, EXECUTION_ISSUER,
        EXECUTION_SECRET,
    };
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    const ISSUER: &str = "https://issuer.example.com/";
    const AUDIENCE: &str = "urn:webtask";
    const SECRET: &str = "a-long-enough-shared-secret";

    fn now() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    fn mint(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn valid_claims() -> serde_json::Value {
        json!({"iss": ISSUER, "aud": AUDIENCE, "exp": now() + 300, "scope": "wt:admin"})
    }

    async fn verifier() -> JwtVerifier {
        let ctx = RequestContext::builder()
            .meta(AUTHORIZE_EXECUTION, "1")
            .meta(EXECUTION_ISSUER, ISSUER)
            .meta(EXECUTION_AUDIENCE, AUDIENCE)
            .meta(EXECUTION_ALGORITHM, "HS256")
            .secret(EXECUTION_SECRET, SECRET)
            .build();
        let config = JwtAuthConfig::from_context(&ctx).unwrap();
        JwtVerifier::build(&config, &reqwest::Client::new(), &JwksConfig::default())
            .await
            .unwrap()
    }

    async fn failure(token: &str) -> WebtaskError {
        verifier().await.verify(token).await.unwrap_err()
    }

    #[tokio::test]
    async fn test_valid_token() {
        let claims = verifier()
            .await
            .verify(&mint(valid_claims(), SECRET))
            .await
            .unwrap();
        assert_eq!(claims.get("scope"), Some(&json!("wt:admin")));
    }

    #[tokio::test]
    async fn test_failure_messages() {
        let mut expired = valid_claims();
        expired["exp"] = json!(now() - 10);
        let mut wrong_iss = valid_claims();
        wrong_iss["iss"] = json!("https://evil.example.com/");
        let mut wrong_aud = valid_claims();
        wrong_aud["aud"] = json!("urn:other");
        let mut not_yet = valid_claims();
        not_yet["nbf"] = json!(now() + 300);
        let mut no_exp = valid_claims();
        no_exp.as_object_mut().unwrap().remove("exp");

        let cases = [
            (mint(expired, SECRET), "jwt expired"),
            (mint(wrong_iss, SECRET), "jwt issuer invalid"),
            (mint(wrong_aud, SECRET), "jwt audience invalid"),
            (mint(not_yet, SECRET), "jwt not active"),
            (mint(no_exp, SECRET), "jwt missing required claim"),
            (mint(valid_claims(), "another-secret"), "invalid signature"),
            ("not.a.jwt".to_string(), "jwt malformed"),
        ];

        for (token, message) in cases {
            let err = failure(&token).await;
            assert_eq!(err.message(), message);
            assert_eq!(err.status_code().as_u16(), 401);
            assert_eq!(
                err.fields().and_then(|f| f.code.as_deref()),
                Some("invalid_token")
            );
        }
    }

    #[tokio::test]
    async fn test_rejects_other_algorithms() {
        let token = encode(
            &Header::new(jsonwebtoken::Algorithm::HS384),
            &valid_claims(),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(failure(&token).await.message(), "invalid algorithm");
    }
}
