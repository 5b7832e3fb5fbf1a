//! Winget static mirror library.
//!
//! Serves a pre-built winget artifact tree (patched manifests and installer
//! downloads) over HTTPS, with per-class caching and rate limiting.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──TLS──▶ net (listener, rustls) ──▶ http::server
//!                                                 │
//!                     routing (prefix → RouteClass)
//!                                                 │
//!                     security (rate limit, CORS, headers)
//!                                                 │
//!                     cache ◀──▶ resolver (root-checked files)
//!                                                 │
//!   Client ◀── http::response (304 / 206 / streamed body)
//!
//!   Cross-cutting: config, observability, health, admin, lifecycle
//! ```

pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resolver;
pub mod routing;
pub mod security;

pub use config::MirrorConfig;
pub use error::{MirrorError, MirrorResult};
pub use http::{MirrorServer, MirrorState};
pub use lifecycle::Shutdown;
