//! Version-aware transformation pipeline.
//!
//! # Data Flow
//! ```text
//! Orchestrator
//!     → resolver.rs  (active document: cache → store → built-in default)
//!     → engine.rs    (compile-or-fetch, evaluate under a deadline)
//!     → cache.rs     (source digest → compiled program, LRU + TTL)
//! ```
//!
//! # Design Decisions
//! - The expression cache and the resolver slot are the only shared
//!   mutable state in the pipeline
//! - Failures are values (`TransformationOutcome`), so the orchestrator
//!   decides per leg whether a failure is fatal

pub mod cache;
pub mod defaults;
pub mod engine;
pub mod resolver;
pub mod types;

pub use cache::ExpressionCache;
pub use defaults::default_config;
pub use engine::TransformationEngine;
pub use resolver::{ConfigResolver, ConfigSource, ResolverStatus};
pub use types::{
    Direction, TransformContext, TransformMetrics, TransformationConfig, TransformationExpression,
    TransformationOutcome, VersionTransformation,
};
