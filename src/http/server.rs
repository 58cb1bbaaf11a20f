//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing, panic capture)
//! - Bind server to listener and drain on shutdown
//! - Dispatch every request to the orchestrator
//!
//! # Design Decisions
//! - Body limit and request deadline live in the orchestrator so their
//!   errors use the gateway's JSON error shape

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::http::response;
use crate::http::upstream::UpstreamClient;
use crate::lifecycle::{shutdown, Components};
use crate::transform::{ConfigResolver, TransformationEngine};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub resolver: Arc<ConfigResolver>,
    pub engine: Arc<TransformationEngine>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(config: GatewayConfig, components: &Components) -> Self {
        let upstream = UpstreamClient::new(
            &config.upstream.base_url,
            Duration::from_secs(config.upstream.request_timeout_secs),
        );
        let settings = OrchestratorSettings {
            max_body_bytes: config.limits.max_body_bytes,
            max_response_bytes: config.limits.max_response_bytes,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        };
        let orchestrator = Orchestrator::new(
            Arc::clone(&components.resolver),
            Arc::clone(&components.engine),
            upstream,
            settings,
        );
        Self {
            orchestrator: Arc::new(orchestrator),
            resolver: Arc::clone(&components.resolver),
            engine: Arc::clone(&components.engine),
            config: Arc::new(config),
        }
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: GatewayConfig, components: &Components) -> Self {
        let state = AppState::new(config, components);
        let router = Self::build_router(&state);
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: &AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TraceLayer::new_for_http())
                    .layer(CatchPanicLayer::custom(response::panic_response)),
            )
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.state.config.upstream.base_url,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.orchestrator.handle(request).await
}
