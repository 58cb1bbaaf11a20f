//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the configuration store described by the process config
//! - Wire the resolver and engine on top of it
//! - Start the optional store watcher
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use notify::RecommendedWatcher;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::schema::{GatewayConfig, StoreKind};
use crate::config::watcher::StoreWatcher;
use crate::store::{self, ConfigStore, StoreError};
use crate::transform::{ConfigResolver, TransformationEngine};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration store: {0}")]
    Store(#[from] StoreError),

    #[error("Store watcher: {0}")]
    Watch(#[from] notify::Error),
}

/// The shared pipeline objects every server needs.
#[derive(Clone)]
pub struct Components {
    pub store: Arc<dyn ConfigStore>,
    pub resolver: Arc<ConfigResolver>,
    pub engine: Arc<TransformationEngine>,
}

impl Components {
    pub fn with_store(config: &GatewayConfig, store: Arc<dyn ConfigStore>) -> Self {
        let resolver = Arc::new(ConfigResolver::new(
            Arc::clone(&store),
            config.resolver.config_key.clone(),
            Duration::from_secs(config.resolver.cache_ttl_secs),
        ));
        let engine = Arc::new(TransformationEngine::builtin(
            config.transform.cache_capacity,
            Duration::from_millis(config.transform.timeout_ms),
        ));
        Self { store, resolver, engine }
    }

    /// Start the file store watcher if configured. Keep the handle alive.
    pub fn watch_store(&self, config: &GatewayConfig) -> Result<Option<RecommendedWatcher>, StartupError> {
        match (&config.store.path, config.store.kind, config.store.watch) {
            (Some(root), StoreKind::File, true) => {
                let watcher = StoreWatcher::new(root, Arc::clone(&self.resolver)).run()?;
                Ok(Some(watcher))
            }
            _ => Ok(None),
        }
    }
}

/// Build the store from config and wire the pipeline on top of it.
pub async fn initialize(config: &GatewayConfig) -> Result<Components, StartupError> {
    let store = store::from_config(&config.store, &config.resolver.config_key).await?;
    let components = Components::with_store(config, store);
    tracing::info!(
        config_key = %config.resolver.config_key,
        cache_ttl_secs = config.resolver.cache_ttl_secs,
        transform_timeout_ms = config.transform.timeout_ms,
        cache_capacity = config.transform.cache_capacity,
        "Transformation pipeline initialized"
    );
    Ok(components)
}
