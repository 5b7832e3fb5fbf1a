//! TCP listener binding.
//!
//! # Responsibilities
//! - Parse and bind configured addresses
//! - Hand std listeners to axum-server (HTTPS) and tokio listeners to
//!   `axum::serve` (redirect, admin)
//! - Report the bound address (port 0 in tests)

use std::net::SocketAddr;

use tokio::net::TcpListener;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid listen address {addr:?}: {source}")]
    Address {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

fn parse(addr: &str) -> Result<SocketAddr, ListenerError> {
    addr.parse().map_err(|source| ListenerError::Address {
        addr: addr.to_string(),
        source,
    })
}

/// Bind a non-blocking std listener, as axum-server expects.
pub fn bind_std(addr: &str) -> Result<std::net::TcpListener, ListenerError> {
    let addr = parse(addr)?;
    let bind_err = |source| ListenerError::Bind { addr, source };

    let listener = std::net::TcpListener::bind(addr).map_err(bind_err)?;
    listener.set_nonblocking(true).map_err(bind_err)?;

    tracing::info!(address = %listener.local_addr().map_err(bind_err)?, "Listener bound");
    Ok(listener)
}

/// Bind a tokio listener.
pub async fn bind(addr: &str) -> Result<TcpListener, ListenerError> {
    let addr = parse(addr)?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind { addr, source })?;

    let local = listener
        .local_addr()
        .map_err(|source| ListenerError::Bind { addr, source })?;
    tracing::info!(address = %local, "Listener bound");
    Ok(listener)
}
