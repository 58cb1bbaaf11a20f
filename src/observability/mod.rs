//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing macros  → logging.rs (EnvFilter + fmt layer, pretty or JSON)
//!     → metrics.rs      → Prometheus exporter (optional HTTP listener)
//!
//! Request correlation:
//!     → X-Request-ID generated at the edge, echoed on responses,
//!       forwarded upstream and attached to log events
//! ```
//!
//! # Design Decisions
//! - No component holds a logger; the global tracing dispatcher is the
//!   single injection point and tests may scope their own subscriber
//! - Metric updates go through the `metrics` facade and are no-ops until
//!   an exporter is installed

pub mod logging;
pub mod metrics;
