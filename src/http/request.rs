//! Inbound request context.
//!
//! # Responsibilities
//! - Read the request ID assigned at the edge
//! - Detect the client's API version
//! - Parse the body as JSON, best effort
//!
//! # Version Detection
//! First match wins:
//! ```text
//! API-Version / X-API-Version header
//!     → ?api-version= / ?version= query parameter
//!     → leading path segment /v<digits>/...
//!     → none (use the configured default)
//! ```

use axum::body::Bytes;
use axum::http::{request::Parts, HeaderMap, Method};
use regex::Regex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::OnceLock;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const API_VERSION: &str = "api-version";
pub const X_API_VERSION: &str = "x-api-version";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

const VERSION_QUERY_PARAMS: [&str; 2] = ["api-version", "version"];

fn version_path_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^/(v\d+)(?:/|$)").ok()).as_ref()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Detect the client version from headers, query and path, in that order.
pub fn detect_version(headers: &HeaderMap, path: &str, query: Option<&str>) -> Option<String> {
    if let Some(version) = header_str(headers, API_VERSION).or_else(|| header_str(headers, X_API_VERSION)) {
        return Some(version.to_string());
    }

    if let Some(query) = query {
        for wanted in VERSION_QUERY_PARAMS {
            let found = url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, value)| key == wanted && !value.trim().is_empty())
                .map(|(_, value)| value.trim().to_string());
            if found.is_some() {
                return found;
            }
        }
    }

    version_path_pattern()?
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parse a request body as JSON. Empty or unparseable bodies count as absent.
pub fn parse_json_body(bytes: &Bytes, request_id: &str) -> Option<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(request_id, error = %e, "Request body is not JSON; treating as absent");
            None
        }
    }
}

/// Everything the orchestrator needs to know about an inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub version: Option<String>,
    pub body: Option<Value>,
    /// Value for the upstream `X-Forwarded-For` header.
    pub forwarded_for: Option<String>,
}

impl RequestContext {
    pub fn new(parts: &Parts, body: &Bytes, request_id: &str, peer: Option<SocketAddr>) -> Self {
        let path = parts.uri.path().to_string();
        let query = parts.uri.query().map(str::to_string);
        let version = detect_version(&parts.headers, &path, query.as_deref());

        let forwarded_for = match (header_str(&parts.headers, X_FORWARDED_FOR), peer) {
            (Some(chain), Some(peer)) => Some(format!("{}, {}", chain, peer.ip())),
            (Some(chain), None) => Some(chain.to_string()),
            (None, Some(peer)) => Some(peer.ip().to_string()),
            (None, None) => None,
        };

        Self {
            request_id: request_id.to_string(),
            method: parts.method.clone(),
            path,
            query,
            version,
            body: parse_json_body(body, request_id),
            forwarded_for,
        }
    }

    /// Path plus query, as forwarded upstream.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}
