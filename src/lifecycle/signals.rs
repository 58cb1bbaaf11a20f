//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGTERM / SIGINT and trigger graceful shutdown
//! - Turn SIGHUP into a transformation config reload (unix only)

use std::sync::Arc;

use crate::lifecycle::shutdown::Shutdown;
use crate::transform::ConfigResolver;

/// Resolve on Ctrl-C or SIGTERM.
pub async fn termination() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Wait for a termination signal, then broadcast shutdown.
pub async fn shutdown_on_signal(shutdown: Shutdown) {
    termination().await;
    tracing::info!("Shutdown signal received, draining connections");
    shutdown.trigger();
}

/// Reload the resolver on every SIGHUP until shutdown.
#[cfg(unix)]
pub async fn reload_on_hangup(resolver: Arc<ConfigResolver>, shutdown: Shutdown) {
    let mut hangup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler; reload via admin API only");
            return;
        }
    };
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = stop.recv() => break,
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }
                let config = resolver.reload().await;
                tracing::info!(versions = ?config.versions(), "SIGHUP: transformation config reloaded");
            }
        }
    }
}

#[cfg(not(unix))]
pub async fn reload_on_hangup(_resolver: Arc<ConfigResolver>, _shutdown: Shutdown) {}
