//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection
//!     → server.rs (Axum setup, middleware stack, dispatch)
//!     → request.rs (request ID)
//!     → [routing layer classifies the path]
//!     → [resolver + cache find the artifact]
//!     → conditional.rs (304 / 206 / 416)
//!     → response.rs (headers, streamed body)
//!     → Send to client
//!
//! Plain HTTP connection
//!     → redirect.rs (301 to https)
//! ```

pub mod conditional;
pub mod redirect;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{build_router, Listeners, MirrorServer, MirrorState, SharedState};
