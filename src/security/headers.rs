//! Security response headers.
//!
//! # Responsibilities
//! - `Strict-Transport-Security` on every HTTPS response
//! - `X-Content-Type-Options: nosniff`
//! - A `Server` value that carries no version
//!
//! # Design Decisions
//! - Values are built once at startup; invalid config fails startup
//! - Headers override whatever a handler set

use axum::http::header::{self, HeaderName, HeaderValue, InvalidHeaderValue};

use crate::config::SecurityConfig;

/// `Strict-Transport-Security` value for the configured policy.
pub fn hsts_value(config: &SecurityConfig) -> String {
    let mut value = format!("max-age={}", config.hsts_max_age_secs);
    if config.hsts_include_subdomains {
        value.push_str("; includeSubDomains");
    }
    value
}

/// Headers attached to every HTTPS response.
pub fn security_headers(
    config: &SecurityConfig,
) -> Result<Vec<(HeaderName, HeaderValue)>, InvalidHeaderValue> {
    Ok(vec![
        (
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_str(&hsts_value(config))?,
        ),
        (
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
        (header::SERVER, HeaderValue::from_str(&config.server_name)?),
    ])
}
