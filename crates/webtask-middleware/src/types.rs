//! Common types used throughout the middleware pipeline.

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use webtask_core::{WebtaskError, WebtaskResult};

/// The HTTP request type accepted at the transport boundary.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type produced by a pipeline run.
pub type Response = http::Response<Full<Bytes>>;

/// Builds a response with the given status, content type and body.
pub fn build_response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response {
    let mut response = http::Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Builds an `application/json` response from pre-serialized bytes.
pub fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response {
    build_response(status, "application/json", body.into())
}

/// Single-use slot for the response of one pipeline run.
///
/// Exactly one response leaves the pipeline per invocation; a second write
/// is rejected as a contract violation.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use webtask_middleware::ResponseSink;
///
/// let mut sink = ResponseSink::new();
/// sink.send_json(StatusCode::OK, &"OK").unwrap();
/// assert!(sink.is_sent());
/// assert!(sink.send_text(StatusCode::OK, "again").is_err());
/// ```
#[derive(Debug, Default)]
pub struct ResponseSink {
    response: Option<Response>,
    sent: bool,
}

impl ResponseSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the response.
    pub fn send(&mut self, response: Response) -> WebtaskResult<()> {
        if self.sent {
            return Err(WebtaskError::contract_violation(
                "a response was already sent for this request",
            ));
        }
        self.sent = true;
        self.response = Some(response);
        Ok(())
    }

    /// Serializes `value` and writes it as a JSON response.
    pub fn send_json<T: Serialize + ?Sized>(
        &mut self,
        status: StatusCode,
        value: &T,
    ) -> WebtaskResult<()> {
        let body = serde_json::to_vec(value)
            .map_err(|e| WebtaskError::serialization(e.to_string()))?;
        self.send(json_response(status, body))
    }

    /// Writes a plain-text response.
    pub fn send_text(&mut self, status: StatusCode, body: impl Into<String>) -> WebtaskResult<()> {
        self.send(build_response(
            status,
            "text/plain; charset=utf-8",
            Bytes::from(body.into()),
        ))
    }

    /// Returns `true` once a response was written.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Takes the written response out of the sink.
    pub fn take(&mut self) -> Option<Response> {
        self.response.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response_headers() {
        let response = json_response(StatusCode::CREATED, "{}");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_sink_rejects_second_write() {
        let mut sink = ResponseSink::new();
        assert!(!sink.is_sent());

        sink.send_text(StatusCode::OK, "first").unwrap();
        let err = sink.send_text(StatusCode::OK, "second").unwrap_err();
        assert_eq!(err.kind(), webtask_core::ErrorKind::ContractViolation);

        let response = sink.take().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(sink.is_sent());
    }

    #[test]
    fn test_send_json_reports_serialization_failure() {
        use std::collections::HashMap;

        // Maps with non-string keys cannot become JSON objects.
        let mut bad: HashMap<Vec<u8>, u8> = HashMap::new();
        bad.insert(vec![1], 1);

        let mut sink = ResponseSink::new();
        let err = sink.send_json(StatusCode::OK, &bad).unwrap_err();
        assert_eq!(err.kind(), webtask_core::ErrorKind::Serialization);
        assert!(!sink.is_sent());
    }
}
