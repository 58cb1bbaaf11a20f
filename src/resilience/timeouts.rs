//! Timeout enforcement for blocking work.
//!
//! # Responsibilities
//! - Run synchronous work on Tokio's blocking pool
//! - Bound the wait with a deadline
//! - Report timeouts distinctly from worker failures
//!
//! # Limitations
//! Tokio cannot preempt a blocking closure. When the deadline passes the
//! join handle is dropped and the closure keeps running until it returns;
//! callers that need it to stop early must signal it themselves.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeoutError {
    /// The deadline passed before the work finished.
    #[error("timed out after {}ms", .0.as_millis())]
    Elapsed(Duration),

    /// The worker panicked or was cancelled.
    #[error("worker failed: {0}")]
    Worker(String),
}

/// Run `work` on the blocking pool, waiting at most `deadline` for its result.
pub async fn run_blocking_with_deadline<F, T>(deadline: Duration, work: F) -> Result<T, TimeoutError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(deadline, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) => Err(TimeoutError::Worker(join_error.to_string())),
        Err(_) => Err(TimeoutError::Elapsed(deadline)),
    }
}
