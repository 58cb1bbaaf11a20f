//! Client-facing responses and error mapping.
//!
//! # Responsibilities
//! - Map every gateway failure to a status code and a JSON body
//! - Attach version and request-ID headers to every response
//! - Strip hop-by-hop headers copied from the upstream
//!
//! # Design Decisions
//! - Error bodies carry a stable code, a message and the request ID;
//!   internal error objects are never serialized
//! - Upstream transport failures are 502, upstream timeouts 504
//! - Body limits and the overall request deadline are enforced by the
//!   orchestrator rather than tower-http layers, so they share this JSON shape

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::any::Any;
use thiserror::Error;

use super::request::{X_API_VERSION, X_REQUEST_ID};

pub const X_UPSTREAM_VERSION: &str = "x-upstream-version";

const HOP_BY_HOP: [HeaderName; 6] = [
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
    header::PROXY_AUTHENTICATE,
];

/// Failures the orchestrator reports to the client.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("API version '{version}' is not supported")]
    UnsupportedVersion { version: String, supported: Vec<String> },

    #[error("No transformation configured for version '{0}'")]
    MissingTransformation(String),

    #[error("Request transformation failed: {0}")]
    RequestTransformation(String),

    #[error("Failed to read request body: {0}")]
    BodyRead(String),

    #[error("Request body exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Upstream did not respond within {0}s")]
    UpstreamTimeout(u64),

    #[error("Request was not completed within {0}s")]
    RequestTimeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::UnsupportedVersion { .. } => StatusCode::BAD_REQUEST,
            GatewayError::RequestTransformation(_) => StatusCode::BAD_REQUEST,
            GatewayError::BodyRead(_) => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::MissingTransformation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::RequestTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::UnsupportedVersion { .. } => "unsupported_version",
            GatewayError::MissingTransformation(_) => "transformation_missing",
            GatewayError::RequestTransformation(_) => "request_transformation_failed",
            GatewayError::BodyRead(_) => "invalid_request_body",
            GatewayError::PayloadTooLarge(_) => "payload_too_large",
            GatewayError::Upstream(_) => "upstream_unavailable",
            GatewayError::UpstreamTimeout(_) => "upstream_timeout",
            GatewayError::RequestTimeout(_) => "request_timeout",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    /// Render as a JSON error response tagged with the request ID and version.
    pub fn into_response_for(self, request_id: &str, version: Option<&str>) -> Response {
        let supported = match &self {
            GatewayError::UnsupportedVersion { supported, .. } => Some(supported.clone()),
            _ => None,
        };
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            request_id: Some(request_id),
            supported_versions: supported,
        };
        let mut response = (self.status(), axum::Json(body)).into_response();
        set_header(response.headers_mut(), X_REQUEST_ID, request_id);
        if let Some(version) = version {
            set_header(response.headers_mut(), X_API_VERSION, version);
        }
        response
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody<'a> {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_versions: Option<Vec<String>>,
}

/// Response for a handler panic. The request ID header is added by the
/// propagation layer further out.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "Request handler panicked");

    let body = ErrorBody {
        error: "internal_error",
        message: "Internal server error".to_string(),
        request_id: None,
        supported_versions: None,
    };
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
}

/// Insert `name: value`, ignoring values that are not valid header text.
pub fn set_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// Copy upstream headers minus hop-by-hop ones.
pub fn forwardable_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unsupported_version_body() {
        let err = GatewayError::UnsupportedVersion {
            version: "v9".into(),
            supported: vec!["v1".into(), "v2".into()],
        };
        let response = err.into_response_for("req-1", Some("v9"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[X_REQUEST_ID], "req-1");
        assert_eq!(response.headers()[X_API_VERSION], "v9");

        let body = body_json(response).await;
        assert_eq!(body["error"], "unsupported_version");
        assert_eq!(body["requestId"], "req-1");
        assert_eq!(body["supportedVersions"], serde_json::json!(["v1", "v2"]));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        assert_eq!(GatewayError::MissingTransformation("v1".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(GatewayError::RequestTransformation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(GatewayError::Upstream("refused".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(GatewayError::UpstreamTimeout(30).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(GatewayError::RequestTimeout(35).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(GatewayError::PayloadTooLarge(64).status(), StatusCode::PAYLOAD_TOO_LARGE);

        let body = body_json(GatewayError::Upstream("refused".into()).into_response_for("r", None)).await;
        assert!(body.get("supportedVersions").is_none());
        assert_eq!(body["message"], "Upstream request failed: refused");

        let body = body_json(GatewayError::PayloadTooLarge(64).into_response_for("r", Some("v1"))).await;
        assert_eq!(body["error"], "payload_too_large");
        assert_eq!(body["requestId"], "r");
    }

    #[tokio::test]
    async fn test_panic_response_is_json() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "internal_error");
    }

    #[test]
    fn test_hop_by_hop_headers_stripped() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        let headers = forwardable_headers(&upstream);
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    }
}
