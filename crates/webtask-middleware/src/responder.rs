//! Error responses.
//!
//! Every failure leaves the pipeline as
//! `{"message": ..., "statusCode": ...}` plus, for non-500 statuses, the
//! allow-listed fields of [`ErrorFields`]. A 500 never carries the original
//! message or extras.

use crate::types::{json_response, Response};
use http::StatusCode;
use serde::Serialize;
use webtask_core::{ErrorFields, WebtaskError};

/// Message sent in place of any 500 error's own message.
pub const SERVER_ERROR_MESSAGE: &str = "Server error";

const FALLBACK_BODY: &str = r#"{"message":"Server error","statusCode":500}"#;

#[derive(Debug, Serialize)]
struct ErrorPayload<'a> {
    message: &'a str,
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(flatten)]
    extras: Option<&'a ErrorFields>,
}

/// Builds the wire response for `error`.
#[must_use]
pub fn error_response(error: &WebtaskError) -> Response {
    let status = error.status_code();

    let payload = if status == StatusCode::INTERNAL_SERVER_ERROR {
        ErrorPayload {
            message: SERVER_ERROR_MESSAGE,
            status_code: status.as_u16(),
            extras: None,
        }
    } else {
        ErrorPayload {
            message: error.message(),
            status_code: status.as_u16(),
            extras: error.fields().filter(|fields| !fields.is_empty()),
        }
    };

    match serde_json::to_vec(&payload) {
        Ok(body) => json_response(status, body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize error payload");
            json_response(StatusCode::INTERNAL_SERVER_ERROR, FALLBACK_BODY)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_server_errors_are_masked() {
        let err = WebtaskError::resolution("module `secret-internal-name` is not registered");
        let response = error_response(&err);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(
            body_json(response).await,
            json!({"message": "Server error", "statusCode": 500})
        );
    }

    #[tokio::test]
    async fn test_masking_drops_extras() {
        let err = WebtaskError::custom(StatusCode::INTERNAL_SERVER_ERROR, "db password is hunter2")
            .with_fields(ErrorFields::new().code("E_DB"));

        assert_eq!(
            body_json(error_response(&err)).await,
            json!({"message": "Server error", "statusCode": 500})
        );
    }

    #[tokio::test]
    async fn test_client_errors_forward_message_and_extras() {
        let err = WebtaskError::custom(StatusCode::PAYMENT_REQUIRED, "Quota exceeded").with_fields(
            ErrorFields::new()
                .code("quota")
                .errno(7)
                .error("quota_exceeded")
                .error_description("Upgrade your plan")
                .data(json!({"limit": 10})),
        );

        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            body_json(response).await,
            json!({
                "message": "Quota exceeded",
                "statusCode": 402,
                "code": "quota",
                "errno": 7,
                "error": "quota_exceeded",
                "error_description": "Upgrade your plan",
                "data": {"limit": 10}
            })
        );
    }

    #[tokio::test]
    async fn test_upstream_errors_are_not_masked() {
        let err = WebtaskError::upstream("Missing jwks_uri property on oidc-discovery endpoint");
        let response = error_response(&err);

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(response).await,
            json!({
                "message": "Missing jwks_uri property on oidc-discovery endpoint",
                "statusCode": 502
            })
        );
    }
}
