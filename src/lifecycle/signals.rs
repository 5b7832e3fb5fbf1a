//! OS signal handling.
//!
//! # Responsibilities
//! - SIGTERM/SIGINT trigger graceful shutdown
//! - SIGHUP triggers a certificate reload, not shutdown
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Signal handler installation failures are logged, never fatal

use tokio::sync::mpsc;

use crate::lifecycle::Shutdown;

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
    tracing::info!("Shutdown signal received");
}

/// Spawn the signal listeners.
///
/// Shutdown signals trigger `shutdown`; SIGHUP sends on `reload_tx`.
pub fn spawn_signal_handlers(shutdown: Shutdown, reload_tx: mpsc::UnboundedSender<()>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading TLS certificate");
            if reload_tx.send(()).is_err() {
                break;
            }
        }
    });

    #[cfg(not(unix))]
    drop(reload_tx);
}
