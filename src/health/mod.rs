//! Health endpoint.
//!
//! # Data Flow
//! ```text
//! GET /health
//!     → readiness.rs (stat each configured artifact root)
//!     → 200 {"status":"ok"} | 503 {"status":"degraded"}
//! ```
//!
//! # Design Decisions
//! - Bypasses the rate limiter, the cache and CORS
//! - Never cached by clients (`no-store`)

pub mod readiness;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::cache::NO_STORE;
use crate::resolver::StaticResolver;

pub use readiness::{HealthReport, HealthStatus};

/// Build the health response.
pub async fn health_response(resolver: &StaticResolver) -> Response {
    let report = readiness::check(resolver).await;
    let status = if report.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let mut response = (status, Json(report)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    response
}
