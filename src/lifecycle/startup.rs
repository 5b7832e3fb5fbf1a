//! Startup orchestration.
//!
//! # Responsibilities
//! - Check the artifact roots before anything binds
//! - Load the TLS certificate
//! - Initialize subsystems in dependency order
//! - Start background tasks (metrics, certificate reload)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use tokio::sync::mpsc;

use crate::config::{MirrorConfig, TlsConfig};
use crate::http::{Listeners, MirrorServer, MirrorState};
use crate::lifecycle::{signals, Shutdown};
use crate::net::cert_watcher::CertWatcher;
use crate::net::listener::{self, ListenerError};
use crate::net::tls::{self, TlsError};
use crate::observability::metrics;
use crate::routing::RouteClass;

/// Quiet period after a reload trigger before the files are read.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("{class} root {path:?}: {reason}")]
    Root {
        class: RouteClass,
        path: PathBuf,
        reason: String,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("invalid security header value: {0}")]
    Header(#[from] axum::http::header::InvalidHeaderValue),

    #[error("metrics exporter: {0}")]
    Metrics(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn root_error(class: RouteClass, path: &Path, reason: impl Into<String>) -> StartupError {
    StartupError::Root {
        class,
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Check every configured artifact root: it must exist, be a readable
/// directory, and not be writable by others.
pub fn check_roots(config: &MirrorConfig) -> Result<(), StartupError> {
    for class in [RouteClass::Manifest, RouteClass::Download] {
        if !config.routes.iter().any(|r| r.class == class) {
            continue;
        }
        let Some(root) = config.root_for(class) else {
            continue;
        };

        let metadata =
            std::fs::metadata(root).map_err(|e| root_error(class, root, e.to_string()))?;
        if !metadata.is_dir() {
            return Err(root_error(class, root, "not a directory"));
        }
        if let Err(e) = std::fs::read_dir(root) {
            return Err(root_error(class, root, format!("not readable: {e}")));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if metadata.permissions().mode() & 0o002 != 0 {
                return Err(root_error(class, root, "world-writable"));
            }
        }

        tracing::info!(class = %class, root = ?root, "Artifact root ready");
    }
    Ok(())
}

/// Everything that can be verified without binding a socket.
///
/// Used by `--check` and as the first step of [`run`].
pub fn preflight(config: &MirrorConfig) -> Result<RustlsConfig, StartupError> {
    check_roots(config)?;
    Ok(tls::load_rustls_config(&config.tls)?)
}

/// Bind all configured listeners.
pub async fn bind_listeners(config: &MirrorConfig) -> Result<Listeners, ListenerError> {
    let https = listener::bind_std(&config.listener.https_address)?;
    let http = match &config.listener.http_address {
        Some(addr) => Some(listener::bind(addr).await?),
        None => None,
    };
    let admin = if config.admin.enabled {
        Some(listener::bind(&config.admin.bind_address).await?)
    } else {
        None
    };
    Ok(Listeners { https, http, admin })
}

/// Apply certificate reload requests, coalescing bursts.
pub async fn reload_loop(
    rustls: RustlsConfig,
    config: TlsConfig,
    mut requests: mpsc::UnboundedReceiver<()>,
) {
    while requests.recv().await.is_some() {
        tokio::time::sleep(RELOAD_DEBOUNCE).await;
        while requests.try_recv().is_ok() {}
        // Failure is logged inside; the current certificate stays active.
        let _ = tls::reload(&rustls, &config);
    }
}

/// Start the mirror and serve until a shutdown signal.
pub async fn run(config: MirrorConfig) -> Result<(), StartupError> {
    let rustls = preflight(&config)?;

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|e| StartupError::Metrics(format!("{e}")))?;
        metrics::init_metrics(addr).map_err(|e| StartupError::Metrics(e.to_string()))?;
    }

    let state = Arc::new(MirrorState::from_config(config)?);
    let server = MirrorServer::new(state.clone())?;

    let shutdown = Shutdown::new();
    let (reload_tx, reload_rx) = mpsc::unbounded_channel();
    signals::spawn_signal_handlers(shutdown.clone(), reload_tx.clone());

    // Dropping the watcher stops it; held until the server returns.
    let _watcher = if state.config.tls.watch {
        let (watcher, mut changes) = CertWatcher::new(&state.config.tls);
        match watcher.run() {
            Ok(handle) => {
                tokio::spawn(async move {
                    while changes.recv().await.is_some() {
                        if reload_tx.send(()).is_err() {
                            break;
                        }
                    }
                });
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Certificate watcher unavailable, reload on SIGHUP only");
                None
            }
        }
    } else {
        None
    };
    tokio::spawn(reload_loop(rustls.clone(), state.config.tls.clone(), reload_rx));

    let listeners = bind_listeners(&state.config).await?;
    server.run(listeners, rustls, shutdown).await?;
    Ok(())
}
