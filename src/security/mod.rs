//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Classified request:
//!     → rate_limit.rs (per-class token bucket, 429 on exhaustion)
//!     → [cache / resolver]
//!     → cors.rs (artifact routes only)
//!     → headers.rs (HSTS, nosniff, Server on every response)
//! ```
//!
//! # Design Decisions
//! - Fail closed: path checks in the resolver reject before any I/O
//! - No trust in client input; origins are matched exactly

pub mod cors;
pub mod headers;
pub mod rate_limit;

pub use cors::CorsPolicy;
pub use rate_limit::{rate_limit_middleware, Decision, RateLimiter};
