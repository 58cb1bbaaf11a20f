//! Configuration store subsystem.
//!
//! # Data Flow
//! ```text
//! ConfigResolver
//!     → ConfigStore::get(canonical key)   (transformation document)
//!     → ConfigStore::get(referenced key)  ("ref:" expression sources)
//!
//! Backends:
//!     memory.rs (DashMap, optionally seeded from a JSON file)
//!     file.rs   (one file per key under a root directory)
//! ```
//!
//! # Design Decisions
//! - Key/value only, no transactions; readers tolerate stale values
//! - A missing key is `Ok(None)`, never an error
//! - Errors are typed so callers can log them, but the resolver never
//!   propagates them to request handlers

pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::schema::{StoreConfig, StoreKind};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors returned by a configuration store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is not acceptable to this backend.
    #[error("Invalid store key '{0}'")]
    InvalidKey(String),

    /// The backend could not be reached or read.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Asynchronous key/value store holding transformation configuration.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Build the store described by the process configuration.
///
/// A memory store with a `seed_file` is populated from that file under
/// `config_key` before being returned.
pub async fn from_config(config: &StoreConfig, config_key: &str) -> Result<Arc<dyn ConfigStore>, StoreError> {
    match config.kind {
        StoreKind::File => {
            let root = config
                .path
                .clone()
                .ok_or_else(|| StoreError::Unavailable("file store requires store.path".to_string()))?;
            tracing::info!(root = %root.display(), "Using file-backed configuration store");
            Ok(Arc::new(FileStore::new(root)))
        }
        StoreKind::Memory => {
            let store = MemoryStore::new();
            if let Some(seed) = &config.seed_file {
                let content = tokio::fs::read_to_string(seed).await?;
                store.put(config_key, &content).await?;
                tracing::info!(seed = %seed.display(), key = %config_key, "Seeded in-memory configuration store");
            } else {
                tracing::info!("Using empty in-memory configuration store");
            }
            Ok(Arc::new(store))
        }
    }
}
