//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Expression evaluation:
//!     → timeouts.rs (run on a blocking worker, bounded wait)
//!     → On deadline: caller signals cancellation and discards the result
//!
//! Upstream call:
//!     → tokio::time::timeout in the orchestrator (504 on expiry)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every evaluation has a deadline
//! - No retries: a request either completes once or fails with a clear status
//! - A blocking worker that overruns its deadline is abandoned, not killed

pub mod timeouts;
