//! Upstream HTTP client.
//!
//! # Responsibilities
//! - Compose the upstream URI from the base URL and the inbound path/query
//! - Send only the headers the upstream contract names
//! - Bound each round trip with a timeout

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Method, Request, Response, Uri};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use std::time::Duration;

use super::request::{X_FORWARDED_FOR, X_REQUEST_ID};
use super::response::GatewayError;

/// What the orchestrator forwards for one request.
#[derive(Debug)]
pub struct UpstreamRequest<'a> {
    pub method: Method,
    pub path_and_query: &'a str,
    pub request_id: &'a str,
    pub forwarded_for: Option<&'a str>,
    pub body: Option<Bytes>,
}

#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
    base_url: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn uri_for(&self, path_and_query: &str) -> Result<Uri, GatewayError> {
        format!("{}{}", self.base_url, path_and_query)
            .parse::<Uri>()
            .map_err(|e| GatewayError::Internal(format!("invalid upstream URI: {}", e)))
    }

    pub async fn send(&self, request: UpstreamRequest<'_>) -> Result<Response<Incoming>, GatewayError> {
        let uri = self.uri_for(request.path_and_query)?;

        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            if let Ok(value) = HeaderValue::from_str(request.request_id) {
                headers.insert(X_REQUEST_ID, value);
            }
            if let Some(value) = request.forwarded_for.and_then(|v| HeaderValue::from_str(v).ok()) {
                headers.insert(X_FORWARDED_FOR, value);
            }
            // Bodiless requests must not claim a content type.
            if request.body.is_some() {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
        }

        let body = request.body.map(Body::from).unwrap_or_else(Body::empty);
        let outbound = builder
            .body(body)
            .map_err(|e| GatewayError::Internal(format!("failed to build upstream request: {}", e)))?;

        match tokio::time::timeout(self.timeout, self.client.request(outbound)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(GatewayError::Upstream(e.to_string())),
            Err(_) => Err(GatewayError::UpstreamTimeout(self.timeout.as_secs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uri_composition() {
        let client = UpstreamClient::new("http://users.internal:9000/api/", Duration::from_secs(5));
        assert_eq!(client.base_url(), "http://users.internal:9000/api");
        assert_eq!(
            client.uri_for("/v1/users?page=2").unwrap().to_string(),
            "http://users.internal:9000/api/v1/users?page=2"
        );
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_upstream_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = UpstreamClient::new(&format!("http://{}", addr), Duration::from_secs(5));
        let result = client
            .send(UpstreamRequest {
                method: Method::GET,
                path_and_query: "/",
                request_id: "req-1",
                forwarded_for: None,
                body: None,
            })
            .await;
        assert!(matches!(result, Err(GatewayError::Upstream(_))));
    }
}
