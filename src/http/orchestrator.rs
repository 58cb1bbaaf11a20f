//! Request orchestrator.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → RequestContext (request ID, version, best-effort JSON body)
//!     → effective version = detected or config default
//!     → unsupported?            → 400 + supported versions for the route
//!     → no transformation entry → 500
//!     → request leg (body present, version ≠ upstream, not identity)
//!         failure → 400, never forwarded
//!     → upstream call
//!     → non-JSON response       → streamed through untouched
//!     → response leg (version ≠ upstream, not identity)
//!         failure → logged, original upstream body returned
//!     → version + request-ID headers
//! ```
//!
//! # Design Decisions
//! - A request-leg failure is fatal: the upstream never sees ambiguous data
//! - A response-leg failure is not: the client gets valid, if wrongly
//!   shaped, data instead of a 5xx
//! - One config snapshot serves the whole request; only `ref:` sources
//!   are looked up again
//! - Upstream JSON bodies over `max_response_bytes` are streamed through
//!   untransformed instead of buffered
//! - Panics are converted by the server's catch-panic layer, not here

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{header, response, HeaderMap, Request, Response};
use futures_util::{stream, StreamExt};
use http_body_util::LengthLimitError;
use hyper::body::Incoming;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::request::{RequestContext, X_API_VERSION, X_REQUEST_ID};
use super::response::{forwardable_headers, set_header, GatewayError, X_UPSTREAM_VERSION};
use super::upstream::{UpstreamClient, UpstreamRequest};
use crate::observability::metrics;
use crate::transform::{ConfigResolver, Direction, TransformContext, TransformationEngine, TransformationExpression};

/// Per-request bounds applied by the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub max_body_bytes: usize,
    pub max_response_bytes: usize,
    /// Deadline for the whole request, body read through response.
    pub request_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_body_bytes: 2 * 1024 * 1024,
            max_response_bytes: 10 * 1024 * 1024,
            request_timeout: Duration::from_secs(35),
        }
    }
}

pub struct Orchestrator {
    resolver: Arc<ConfigResolver>,
    engine: Arc<TransformationEngine>,
    upstream: UpstreamClient,
    settings: OrchestratorSettings,
}

/// Upstream JSON body after the buffering attempt.
enum Buffered {
    Complete(Bytes),
    /// Exceeded the buffer limit; replays what was read, then the rest.
    Oversized(Body),
}

/// Versions in play for one request.
struct Negotiated {
    client: String,
    upstream: String,
}

impl Negotiated {
    fn needs_transformation(&self) -> bool {
        self.client != self.upstream
    }
}

fn request_id_of(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Whether `err` or anything in its source chain is a body length-limit hit.
fn exceeds_length_limit(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

impl Orchestrator {
    pub fn new(
        resolver: Arc<ConfigResolver>,
        engine: Arc<TransformationEngine>,
        upstream: UpstreamClient,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            resolver,
            engine,
            upstream,
            settings,
        }
    }

    /// Run one request through the pipeline. Every failure becomes a response.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().clone();
        let request_id = request_id_of(request.headers());
        let mut version: Option<String> = None;

        let deadline = self.settings.request_timeout;
        let outcome = match tokio::time::timeout(deadline, self.process(request, &request_id, &mut version)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GatewayError::RequestTimeout(deadline.as_secs())),
        };

        let response = match outcome {
            Ok(response) => response,
            Err(err) => {
                let status = err.status();
                if status.is_server_error() {
                    tracing::error!(request_id = %request_id, error = %err, status = status.as_u16(), "Request failed");
                } else {
                    tracing::warn!(request_id = %request_id, error = %err, status = status.as_u16(), "Request rejected");
                }
                let label = match &err {
                    GatewayError::UnsupportedVersion { .. } => Some("unsupported".to_string()),
                    _ => version.clone(),
                };
                let response = err.into_response_for(&request_id, version.as_deref());
                version = label;
                response
            }
        };

        metrics::record_request(
            method.as_str(),
            response.status().as_u16(),
            version.as_deref().unwrap_or("none"),
            start,
        );
        response
    }

    async fn process(
        &self,
        request: Request<Body>,
        request_id: &str,
        version: &mut Option<String>,
    ) -> Result<Response<Body>, GatewayError> {
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let (parts, body) = request.into_parts();
        let limit = self.settings.max_body_bytes;
        if content_length(&parts.headers).is_some_and(|len| len > limit) {
            return Err(GatewayError::PayloadTooLarge(limit));
        }
        let bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
            if exceeds_length_limit(&e) {
                GatewayError::PayloadTooLarge(limit)
            } else {
                GatewayError::BodyRead(e.to_string())
            }
        })?;
        let ctx = RequestContext::new(&parts, &bytes, request_id, peer);

        tracing::debug!(
            request_id,
            method = %ctx.method,
            path = %ctx.path,
            detected_version = ?ctx.version,
            has_body = ctx.body.is_some(),
            "Handling request"
        );

        let config = self.resolver.load_config().await;
        let client_version = ctx.version.clone().unwrap_or_else(|| config.default_version.clone());
        *version = Some(client_version.clone());

        if !config.is_supported(&client_version) {
            return Err(GatewayError::UnsupportedVersion {
                supported: config.supported_versions_for(&ctx.path),
                version: client_version,
            });
        }

        let transformation = self
            .resolver
            .resolve_transformation(&config, &client_version)
            .await
            .ok_or_else(|| GatewayError::MissingTransformation(client_version.clone()))?;

        let versions = Negotiated {
            client: client_version,
            upstream: transformation
                .target_version
                .clone()
                .unwrap_or_else(|| config.upstream_version.clone()),
        };

        let outbound = match ctx.body.clone() {
            Some(body) if versions.needs_transformation() && !transformation.request.is_identity() => {
                let context = TransformContext::new(&versions.client, &versions.upstream, Direction::Request);
                let outcome = self.engine.transform(body, &transformation.request, &context).await;
                if !outcome.success {
                    return Err(GatewayError::RequestTransformation(
                        outcome.error.unwrap_or_else(|| "unknown error".to_string()),
                    ));
                }
                Some(outcome.data)
            }
            other => other,
        };

        let body = match outbound {
            Some(value) => Some(Bytes::from(
                serde_json::to_vec(&value).map_err(|e| GatewayError::Internal(e.to_string()))?,
            )),
            None => None,
        };

        let upstream_response = self
            .upstream
            .send(UpstreamRequest {
                method: ctx.method.clone(),
                path_and_query: &ctx.path_and_query(),
                request_id,
                forwarded_for: ctx.forwarded_for.as_deref(),
                body,
            })
            .await?;

        if !is_json(upstream_response.headers()) {
            return Ok(self.passthrough(upstream_response, request_id, &versions));
        }

        let (mut parts, body) = upstream_response.into_parts();
        let raw = match self.buffer_upstream(&parts, body).await? {
            Buffered::Complete(raw) => raw,
            Buffered::Oversized(body) => {
                tracing::warn!(
                    request_id,
                    limit = self.settings.max_response_bytes,
                    "Upstream JSON body exceeds buffer limit; streaming untransformed"
                );
                return Ok(self.stream_through(parts, body, request_id, &versions));
            }
        };

        let payload = if versions.needs_transformation() && !transformation.response.is_identity() {
            self.transform_response(raw, &transformation.response, request_id, &versions)
                .await
        } else {
            raw
        };

        parts.headers = forwardable_headers(&parts.headers);
        parts.headers.remove(header::CONTENT_LENGTH);
        parts
            .headers
            .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        set_header(&mut parts.headers, X_API_VERSION, &versions.client);
        set_header(&mut parts.headers, X_UPSTREAM_VERSION, &versions.upstream);
        set_header(&mut parts.headers, X_REQUEST_ID, request_id);

        Ok(Response::from_parts(parts, Body::from(payload)))
    }

    /// Apply the response leg; on any failure return the upstream bytes untouched.
    async fn transform_response(
        &self,
        raw: Bytes,
        expression: &TransformationExpression,
        request_id: &str,
        versions: &Negotiated,
    ) -> Bytes {
        let value = match serde_json::from_slice(&raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(request_id, error = %e, "Upstream declared JSON but body did not parse; passing through");
                return raw;
            }
        };

        let context = TransformContext::new(&versions.upstream, &versions.client, Direction::Response);
        let outcome = self.engine.transform(value, expression, &context).await;
        if !outcome.success {
            tracing::warn!(
                request_id,
                version = %versions.client,
                error = outcome.error.as_deref().unwrap_or("unknown error"),
                "Response transformation failed; returning upstream body"
            );
            return raw;
        }

        match serde_json::to_vec(&outcome.data) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                tracing::warn!(request_id, error = %e, "Failed to serialize transformed response; returning upstream body");
                raw
            }
        }
    }

    /// Read the upstream body up to `max_response_bytes`.
    async fn buffer_upstream(&self, parts: &response::Parts, body: Incoming) -> Result<Buffered, GatewayError> {
        let limit = self.settings.max_response_bytes;
        if content_length(&parts.headers).is_some_and(|len| len > limit) {
            return Ok(Buffered::Oversized(Body::new(body)));
        }

        let mut rest = Body::new(body).into_data_stream();
        let mut chunks: Vec<Bytes> = Vec::new();
        let mut total = 0usize;
        while let Some(chunk) = rest.next().await {
            let chunk = chunk.map_err(|e| GatewayError::Upstream(format!("failed to read upstream body: {}", e)))?;
            total += chunk.len();
            chunks.push(chunk);
            if total > limit {
                let head = stream::iter(chunks.into_iter().map(Ok::<Bytes, axum::Error>));
                return Ok(Buffered::Oversized(Body::from_stream(head.chain(rest))));
            }
        }

        let mut raw = Vec::with_capacity(total);
        for chunk in &chunks {
            raw.extend_from_slice(chunk);
        }
        Ok(Buffered::Complete(Bytes::from(raw)))
    }

    fn passthrough(&self, upstream: Response<Incoming>, request_id: &str, versions: &Negotiated) -> Response<Body> {
        let (parts, body) = upstream.into_parts();
        self.stream_through(parts, Body::new(body), request_id, versions)
    }

    fn stream_through(
        &self,
        mut parts: response::Parts,
        body: Body,
        request_id: &str,
        versions: &Negotiated,
    ) -> Response<Body> {
        parts.headers = forwardable_headers(&parts.headers);
        set_header(&mut parts.headers, X_API_VERSION, &versions.client);
        set_header(&mut parts.headers, X_REQUEST_ID, request_id);
        Response::from_parts(parts, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_content_type_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));

        headers.insert(header::CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        assert!(is_json(&headers));

        headers.insert(header::CONTENT_TYPE, "application/problem+json".parse().unwrap());
        assert!(is_json(&headers));

        headers.insert(header::CONTENT_TYPE, "text/html".parse().unwrap());
        assert!(!is_json(&headers));
    }

    #[tokio::test]
    async fn test_length_limit_found_in_source_chain() {
        let err = axum::body::to_bytes(Body::from("x".repeat(100)), 64).await.unwrap_err();
        assert!(exceeds_length_limit(&err));

        let other = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "closed");
        assert!(!exceeds_length_limit(&other));
    }

    #[test]
    fn test_content_length_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), None);
        headers.insert(header::CONTENT_LENGTH, "280".parse().unwrap());
        assert_eq!(content_length(&headers), Some(280));
    }

    #[test]
    fn test_request_id_generated_when_missing() {
        let mut headers = HeaderMap::new();
        let generated = request_id_of(&headers);
        assert!(Uuid::parse_str(&generated).is_ok());

        headers.insert(X_REQUEST_ID, "abc-123".parse().unwrap());
        assert_eq!(request_id_of(&headers), "abc-123");
    }
}
