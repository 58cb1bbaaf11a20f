//! Version-aware transformation gateway.
//!
//! Old and new API clients talk to one upstream that speaks a single
//! canonical schema version. Request bodies are rewritten from the client's
//! version into the upstream version, responses are rewritten back.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                    GATEWAY                       │
//!                        │                                                  │
//!     Client Request     │  ┌────────┐   ┌──────────────┐   ┌───────────┐   │
//!     ───────────────────┼─▶│  http  │──▶│ orchestrator │──▶│ upstream  │───┼──▶ Upstream
//!                        │  │ server │   │ (per request)│   │  client   │   │    Service
//!     Client Response    │  └────────┘   └──────┬───────┘   └───────────┘   │
//!     ◀──────────────────┼──────────────────────┤                          │
//!                        │                      ▼                          │
//!                        │   ┌──────────┐   ┌────────┐   ┌──────────────┐  │
//!                        │   │ resolver │   │ engine │──▶│  expression  │  │
//!                        │   │ (config) │   │        │   │    cache     │  │
//!                        │   └────┬─────┘   └────────┘   └──────────────┘  │
//!                        │        ▼                                         │
//!                        │   ┌──────────┐  ┌────────────┐  ┌─────────────┐ │
//!                        │   │  store   │  │   admin    │  │observability│ │
//!                        │   └──────────┘  └────────────┘  └─────────────┘ │
//!                        └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use version_gateway::admin::setup_admin_router;
use version_gateway::config::loader::{load_with_overrides, Overrides};
use version_gateway::http::HttpServer;
use version_gateway::lifecycle::{initialize, shutdown, signals, Shutdown};
use version_gateway::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "version-gateway", version, about = "Version-aware transformation gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Upstream base URL.
    #[arg(long, env = "UPSTREAM_URL")]
    upstream_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Default per-evaluation transformation timeout, in milliseconds.
    #[arg(long, env = "TRANSFORM_TIMEOUT_MS")]
    transform_timeout_ms: Option<u64>,

    /// Transformation config cache TTL, in seconds.
    #[arg(long, env = "CONFIG_CACHE_TTL")]
    config_cache_ttl: Option<u64>,

    /// Bearer token for the admin API.
    #[arg(long, env = "ADMIN_API_KEY", hide_env_values = true)]
    admin_api_key: Option<String>,

    /// Proxy listener address.
    #[arg(long, env = "GATEWAY_BIND")]
    bind: Option<String>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            upstream_url: self.upstream_url.clone(),
            log_level: self.log_level.clone(),
            transform_timeout_ms: self.transform_timeout_ms,
            config_cache_ttl_secs: self.config_cache_ttl,
            admin_api_key: self.admin_api_key.clone(),
            bind_address: self.bind.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_with_overrides(args.config.as_deref(), &args.overrides())?;

    logging::init(&config.observability.log_level, config.observability.log_format)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "version-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        store = ?config.store.kind,
        transform_timeout_ms = config.transform.timeout_ms,
        config_cache_ttl_secs = config.resolver.cache_ttl_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let components = initialize(&config).await?;
    let _store_watcher = components.watch_store(&config)?;

    // Warm the resolver so the first request does not pay for the store read.
    let active = components.resolver.load_config().await;
    tracing::info!(
        source = ?components.resolver.source(),
        versions = ?active.versions(),
        default_version = %active.default_version,
        upstream_version = %active.upstream_version,
        "Transformation config active"
    );

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));
    tokio::spawn(signals::reload_on_hangup(Arc::clone(&components.resolver), shutdown.clone()));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config.clone(), &components);

    if config.admin.enabled {
        let admin_listener = TcpListener::bind(&config.admin.bind_address).await?;
        let admin_app = setup_admin_router(server.state().clone());
        let admin_shutdown = shutdown.subscribe();
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, admin_app)
                .with_graceful_shutdown(shutdown::wait(admin_shutdown))
                .await
            {
                tracing::error!(error = %e, "Admin server failed");
            }
        });
    }

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
