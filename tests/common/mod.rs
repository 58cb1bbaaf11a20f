//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use version_gateway::admin::setup_admin_router;
use version_gateway::config::GatewayConfig;
use version_gateway::http::HttpServer;
use version_gateway::lifecycle::{shutdown, Components, Shutdown};
use version_gateway::store::MemoryStore;

pub const ADMIN_KEY: &str = "test-admin-key";
pub const CONFIG_KEY: &str = "transformation-config";

/// A request as the mock upstream saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What the mock upstream answers.
pub struct Reply {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
    /// Sleep this long before answering.
    pub delay: Option<Duration>,
    /// Send the body in small chunks without a Content-Length.
    pub chunked: bool,
}

impl Reply {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body: body.into(),
            delay: None,
            chunked: false,
        }
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self {
            content_type: "text/plain",
            ..Self::json(body)
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn chunked(mut self) -> Self {
        self.chunked = true;
        self
    }
}

type Responder = Arc<dyn Fn(&Recorded) -> Reply + Send + Sync>;

#[derive(Clone)]
struct MockState {
    responder: Responder,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockUpstream {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last(&self) -> Recorded {
        self.requests().pop().expect("upstream received no request")
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

async fn mock_handler(State(state): State<MockState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    let recorded = Recorded {
        method: parts.method.to_string(),
        path_and_query: parts
            .uri
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_default(),
        headers: parts.headers,
        body,
    };
    let reply = (state.responder)(&recorded);
    state.requests.lock().unwrap().push(recorded);

    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }

    let body = if reply.chunked {
        let chunks: Vec<Result<Bytes, std::io::Error>> = reply
            .body
            .into_bytes()
            .chunks(16)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Body::from_stream(futures_util::stream::iter(chunks))
    } else {
        Body::from(reply.body)
    };

    (
        StatusCode::from_u16(reply.status).unwrap(),
        [("content-type", reply.content_type)],
        body,
    )
        .into_response()
}

/// Start a programmable mock upstream on an ephemeral port.
pub async fn start_mock_upstream<F>(responder: F) -> MockUpstream
where
    F: Fn(&Recorded) -> Reply + Send + Sync + 'static,
{
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        responder: Arc::new(responder),
        requests: Arc::clone(&requests),
    };
    let app = Router::new().fallback(mock_handler).with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockUpstream { addr, requests }
}

/// Mock upstream that echoes the received JSON body (or `{}` when bodiless).
pub async fn start_echo_upstream() -> MockUpstream {
    start_mock_upstream(|req| {
        if req.body.is_empty() {
            Reply::json("{}")
        } else {
            Reply::json(String::from_utf8_lossy(&req.body).into_owned())
        }
    })
    .await
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub store: MemoryStore,
    pub components: Components,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}{}", self.admin_addr, path)
    }
}

/// Start the gateway (and its admin API) in front of `upstream_url`.
pub async fn start_gateway(
    upstream_url: &str,
    store: MemoryStore,
    tweak: impl FnOnce(&mut GatewayConfig),
) -> TestGateway {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.base_url = upstream_url.to_string();
    config.upstream.request_timeout_secs = 5;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config.transform.timeout_ms = 500;
    tweak(&mut config);

    let components = Components::with_store(&config, Arc::new(store.clone()));
    let server = HttpServer::new(config, &components);
    let shutdown = Shutdown::new();

    let admin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin_addr = admin_listener.local_addr().unwrap();
    let admin_app = setup_admin_router(server.state().clone());
    let admin_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        axum::serve(admin_listener, admin_app)
            .with_graceful_shutdown(shutdown::wait(admin_shutdown))
            .await
            .unwrap();
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, server_shutdown).await.unwrap();
    });

    // Give the accept loops a moment to start.
    tokio::time::sleep(Duration::from_millis(20)).await;

    TestGateway {
        addr,
        admin_addr,
        store,
        components,
        shutdown,
    }
}

/// Store holding `document` under the canonical key.
pub fn store_with(document: &str) -> MemoryStore {
    MemoryStore::with_entries([(CONFIG_KEY, document)])
}

/// v1 clients use `user_id`/`full_name`, the v2 upstream uses `id`/`name`.
pub const USERS_DOCUMENT: &str = r#"{
    "schemaVersion": "1.0",
    "defaultVersion": "v1",
    "upstreamVersion": "v2",
    "transformations": {
        "v1": {
            "request": { "source": "{\"id\": user_id, \"name\": full_name}" },
            "response": { "source": "{\"user_id\": id, \"full_name\": name}" }
        },
        "v2": {
            "request": { "source": "$" },
            "response": { "source": "$" }
        }
    },
    "routing": { "/legacy": ["v1"] }
}"#;

/// Send a raw HTTP/1.1 request and return the status code and body.
///
/// Used where reqwest cannot shape the request, e.g. chunked uploads.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut raw = Vec::new();
    // A reset after the response has arrived still leaves it in `raw`.
    let _ = stream.read_to_end(&mut raw).await;

    let text = String::from_utf8_lossy(&raw).into_owned();
    let (head, body) = text.split_once("\r\n\r\n").unwrap_or((text.as_str(), ""));
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    (status, body.to_string())
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
