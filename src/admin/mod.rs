//! Admin API.
//!
//! Served on its own listener (`admin.bind_address`), behind a bearer token.
//!
//! ```text
//! GET  /admin/status        version, uptime, transfers, cache and limiter sizes
//! GET  /admin/cache         per-class hit/miss counters and entry counts
//! POST /admin/cache/purge   {"path": ..} | {"prefix": ..} | empty body (all)
//! GET  /admin/rate-limits   limiter settings and tracked buckets
//! ```

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::SharedState;

pub fn admin_router(state: SharedState) -> Router {
    let api_key: Arc<str> = Arc::from(state.config.admin.api_key.as_str());
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/cache", get(get_cache))
        .route("/admin/cache/purge", post(purge_cache))
        .route("/admin/rate-limits", get(get_rate_limits))
        .layer(middleware::from_fn_with_state(api_key, admin_auth_middleware))
        .with_state(state)
}
