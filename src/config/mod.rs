//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml (optional)
//!     → loader.rs (parse & deserialize, apply CLI/env overrides)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! Transformation documents live in the store, not here:
//!     watcher.rs detects store changes
//!     → ConfigResolver::clear_cache()
//!     → next request re-reads the store
//! ```
//!
//! # Design Decisions
//! - Process config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{ConfigError, Overrides};
pub use schema::GatewayConfig;
pub use watcher::StoreWatcher;
