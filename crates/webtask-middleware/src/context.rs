//! Request context types.
//!
//! [`RequestContext`] carries everything a step may read or enrich for one
//! webtask invocation: the HTTP request parts, the webtask's secrets and
//! metadata, the invocation-bound token, the caller's container, the
//! compiler handle, verified token claims and typed extensions.

use crate::compiler::CompilerHandle;
use crate::types::Request;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Uri};
use http_body_util::BodyExt;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use webtask_core::RequestId;

/// Header used to propagate a request ID from upstream hops.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request state shared by every step of one pipeline run.
///
/// # Example
///
/// ```
/// use webtask_middleware::RequestContext;
///
/// let ctx = RequestContext::builder()
///     .header("authorization", "Bearer s3cr3t")
///     .secret("wt-auth-secret", "s3cr3t")
///     .meta("wt-authorize-execution", "1")
///     .container("acme")
///     .build();
///
/// assert_eq!(ctx.authorization(), Some("Bearer s3cr3t"));
/// assert_eq!(ctx.secret("wt-auth-secret"), Some("s3cr3t"));
/// assert_eq!(ctx.container(), Some("acme"));
/// ```
#[derive(Debug)]
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    secrets: HashMap<String, String>,
    meta: HashMap<String, String>,
    token: Option<String>,
    container: Option<String>,
    compiler: CompilerHandle,
    claims: Option<serde_json::Map<String, serde_json::Value>>,
    started_at: Instant,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl RequestContext {
    /// Starts building a context.
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the `Authorization` header.
    #[must_use]
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    /// Returns the raw request body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns a secret by name.
    #[must_use]
    pub fn secret(&self, name: &str) -> Option<&str> {
        self.secrets.get(name).map(String::as_str)
    }

    /// Returns all secrets.
    #[must_use]
    pub fn secrets(&self) -> &HashMap<String, String> {
        &self.secrets
    }

    /// Returns a metadata value by name.
    #[must_use]
    pub fn meta(&self, name: &str) -> Option<&str> {
        self.meta.get(name).map(String::as_str)
    }

    /// Returns all metadata.
    #[must_use]
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.meta
    }

    /// Returns the token bound to this invocation, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the caller's container identifier.
    #[must_use]
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    /// Returns the compiler handle.
    #[must_use]
    pub fn compiler(&self) -> &CompilerHandle {
        &self.compiler
    }

    /// Returns the compiler handle for replacement.
    pub fn compiler_mut(&mut self) -> &mut CompilerHandle {
        &mut self.compiler
    }

    /// Returns the verified token claims, once a JWT step accepted the request.
    #[must_use]
    pub fn claims(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.claims.as_ref()
    }

    /// Stores verified token claims.
    pub fn set_claims(&mut self, claims: serde_json::Map<String, serde_json::Value>) {
        self.claims = Some(claims);
    }

    /// Returns the elapsed time since the context was built.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    ///
    /// ```
    /// use webtask_middleware::RequestContext;
    ///
    /// #[derive(Clone)]
    /// struct Tenant(&'static str);
    ///
    /// let mut ctx = RequestContext::builder().build();
    /// ctx.set_extension(Tenant("acme"));
    /// assert_eq!(ctx.get_extension::<Tenant>().unwrap().0, "acme");
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Captures the data handed to a context-receiving webtask.
    #[must_use]
    pub fn snapshot(&self) -> WebtaskContext {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let query = self
            .uri
            .query()
            .map(parse_query)
            .unwrap_or_default();

        let body = serde_json::from_slice(&self.body).ok();

        WebtaskContext {
            secrets: self.secrets.clone(),
            meta: self.meta.clone(),
            headers,
            query,
            body,
            container: self.container.clone(),
            token: self.token.clone(),
            claims: self.claims.clone(),
        }
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    serde_urlencoded::from_str(query).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Ignoring undecodable query string");
        HashMap::new()
    })
}

/// Read-only view of a request handed to a context-receiving webtask.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WebtaskContext {
    /// Webtask secrets.
    pub secrets: HashMap<String, String>,
    /// Webtask metadata.
    pub meta: HashMap<String, String>,
    /// Request headers with UTF-8 values.
    pub headers: HashMap<String, String>,
    /// Decoded query-string parameters.
    pub query: HashMap<String, String>,
    /// Request body, when it parses as JSON.
    pub body: Option<serde_json::Value>,
    /// Caller's container identifier.
    pub container: Option<String>,
    /// Token bound to this invocation.
    pub token: Option<String>,
    /// Verified token claims.
    pub claims: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Builder for [`RequestContext`].
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    request_id: Option<RequestId>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    secrets: HashMap<String, String>,
    meta: HashMap<String, String>,
    token: Option<String>,
    container: Option<String>,
    compiler: CompilerHandle,
}

impl RequestContextBuilder {
    /// Seeds the builder from HTTP request parts and a collected body.
    ///
    /// A valid `x-request-id` header is adopted as the request ID.
    #[must_use]
    pub fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(RequestId::parse);

        Self {
            request_id,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            ..Self::default()
        }
    }

    /// Seeds the builder from a transport request.
    pub async fn from_request(request: Request) -> Self {
        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        Self::from_parts(parts, body)
    }

    /// Sets the request ID.
    #[must_use]
    pub fn request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request URI.
    #[must_use]
    pub fn uri(mut self, uri: Uri) -> Self {
        self.uri = uri;
        self
    }

    /// Adds a header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Adds a secret.
    #[must_use]
    pub fn secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }

    /// Replaces all secrets.
    #[must_use]
    pub fn secrets(mut self, secrets: HashMap<String, String>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn meta(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(name.into(), value.into());
        self
    }

    /// Replaces all metadata.
    #[must_use]
    pub fn metadata(mut self, meta: HashMap<String, String>) -> Self {
        self.meta = meta;
        self
    }

    /// Binds a token to this invocation.
    #[must_use]
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the caller's container.
    #[must_use]
    pub fn container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Sets the compiler handle.
    #[must_use]
    pub fn compiler(mut self, compiler: CompilerHandle) -> Self {
        self.compiler = compiler;
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> RequestContext {
        RequestContext {
            request_id: self.request_id.unwrap_or_default(),
            method: self.method,
            uri: self.uri,
            headers: self.headers,
            body: self.body,
            secrets: self.secrets,
            meta: self.meta,
            token: self.token,
            container: self.container,
            compiler: self.compiler,
            claims: None,
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }
}
