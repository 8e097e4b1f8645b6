//! OpenID Connect discovery.

use reqwest::Url;
use webtask_core::{WebtaskError, WebtaskResult};

/// Discovery document location, relative to the issuer.
pub const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Key-set location used with static discovery, relative to the issuer.
pub const STATIC_JWKS_PATH: &str = ".well-known/jwks.json";

/// Resolves `path` against the issuer URL.
///
/// Resolution follows URL reference rules, so an issuer without a trailing
/// slash loses its last path segment.
///
/// ```
/// use webtask_middleware::stages::jwt::issuer_url;
///
/// let url = issuer_url("https://tenant.example.com/", ".well-known/jwks.json").unwrap();
/// assert_eq!(url.as_str(), "https://tenant.example.com/.well-known/jwks.json");
/// ```
///
/// # Errors
///
/// Returns a configuration error when the issuer is not an absolute URL.
pub fn issuer_url(issuer: &str, path: &str) -> WebtaskResult<Url> {
    Url::parse(issuer)
        .and_then(|base| base.join(path))
        .map_err(|e| WebtaskError::configuration(format!("issuer `{issuer}` is not a valid URL: {e}")))
}

/// Fetches the issuer's discovery document and returns its `jwks_uri`.
///
/// # Errors
///
/// Returns an upstream dependency error (502) when the document cannot be
/// fetched, is not a JSON object, or lacks a string `jwks_uri`.
pub async fn discover_jwks_uri(http: &reqwest::Client, issuer: &str) -> WebtaskResult<Url> {
    let url = issuer_url(issuer, DISCOVERY_PATH)?;

    let response = http
        .get(url.clone())
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| {
            tracing::warn!(url = %url, error = %e, "OIDC discovery request failed");
            WebtaskError::upstream("Failed to fetch oidc-discovery document")
        })?;

    let payload: serde_json::Value = response.json().await.map_err(|e| {
        tracing::warn!(url = %url, error = %e, "OIDC discovery returned invalid JSON");
        WebtaskError::upstream("Unexpected response payload from oidc-discovery uri")
    })?;

    let serde_json::Value::Object(document) = payload else {
        return Err(WebtaskError::upstream(
            "Unexpected response payload from oidc-discovery uri",
        ));
    };

    let jwks_uri = document
        .get("jwks_uri")
        .and_then(serde_json::Value::as_str)
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| WebtaskError::upstream("Missing jwks_uri property on oidc-discovery endpoint"))?;

    Url::parse(jwks_uri).map_err(|e| {
        tracing::warn!(jwks_uri, error = %e, "Discovered jwks_uri is not a URL");
        WebtaskError::upstream("Invalid jwks_uri property on oidc-discovery endpoint")
    })
}
