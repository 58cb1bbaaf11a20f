use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::server::AppState;
use crate::transform::{ConfigSource, ResolverStatus, TransformationConfig};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub upstream: String,
    pub supported_versions: Vec<String>,
    pub default_version: String,
    pub upstream_version: String,
    pub resolver: ResolverStatus,
    pub cache: CacheStatus,
}

#[derive(Serialize)]
pub struct CacheStatus {
    pub size: usize,
    pub capacity: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResult {
    pub source: Option<ConfigSource>,
    pub versions: Vec<String>,
    pub default_version: String,
    pub upstream_version: String,
}

fn cache_status(state: &AppState) -> CacheStatus {
    CacheStatus {
        size: state.engine.cache_size(),
        capacity: state.engine.cache_capacity(),
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let config = state.resolver.load_config().await;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        upstream: state.config.upstream.base_url.clone(),
        supported_versions: config.versions(),
        default_version: config.default_version.clone(),
        upstream_version: config.upstream_version.clone(),
        resolver: state.resolver.status(),
        cache: cache_status(&state),
    })
}

pub async fn get_config(State(state): State<AppState>) -> Json<TransformationConfig> {
    let config = state.resolver.load_config().await;
    Json(config.as_ref().clone())
}

pub async fn reload(State(state): State<AppState>) -> Json<ReloadResult> {
    let config = state.resolver.reload().await;
    let source = state.resolver.source();
    tracing::info!(source = ?source, versions = ?config.versions(), "Transformation config reloaded via admin API");
    Json(ReloadResult {
        source,
        versions: config.versions(),
        default_version: config.default_version.clone(),
        upstream_version: config.upstream_version.clone(),
    })
}

pub async fn get_cache(State(state): State<AppState>) -> Json<CacheStatus> {
    Json(cache_status(&state))
}

/// Drop every compiled expression and the cached document.
pub async fn clear_cache(State(state): State<AppState>) -> Json<CacheStatus> {
    state.engine.clear_cache();
    state.resolver.clear_cache();
    Json(cache_status(&state))
}
