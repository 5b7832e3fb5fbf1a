//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, hand to axum-server / axum::serve)
//!     → tls.rs (rustls handshake, TLS 1.2/1.3, ALPN h2 + http/1.1)
//!     → Hand off to HTTP layer
//!     → connection.rs (per-transfer tracking while a body streams)
//!
//! Certificate reload:
//!     cert_watcher.rs (file change) | SIGHUP
//!     → tls::reload (swap in place, keep old on failure)
//! ```

pub mod cert_watcher;
pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{TransferGuard, TransferTracker};
pub use tls::{HandshakeLoggingAcceptor, TlsError};
