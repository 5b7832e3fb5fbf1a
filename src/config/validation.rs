//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates > 0, TTLs > 0, addresses parse)
//! - Detect duplicate or malformed route prefixes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MirrorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::{BucketConfig, MirrorConfig, ADMIN_KEY_PLACEHOLDER};
use crate::routing::RouteClass;

/// Longest accepted cache TTL (ten years).
pub const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Accepted token refill rates, in requests per second.
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;
pub const MAX_REQUESTS_PER_SECOND: f64 = 1_000_000.0;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("routes: at least one route is required")]
    NoRoutes,

    #[error("routes: invalid prefix '{0}' (must start with '/' and contain no '.' segments)")]
    InvalidPrefix(String),

    #[error("routes: duplicate prefix '{0}'")]
    DuplicatePrefix(String),

    #[error("{class}.root: must not be empty")]
    MissingRoot { class: RouteClass },

    #[error("{class}.rate_limit: {reason}")]
    InvalidBucket { class: RouteClass, reason: &'static str },

    #[error("{class}.cache_ttl_secs: must be greater than zero")]
    ZeroTtl { class: RouteClass },

    #[error("{class}.cache_ttl_secs: must not exceed ten years")]
    TtlTooLong { class: RouteClass },

    #[error("cache.max_entries: must be greater than zero when the cache is enabled")]
    ZeroCacheEntries,

    #[error("security.server_name: '{0}' must be a non-empty token without a version")]
    InvalidServerName(String),

    #[error("cors.allowed_origins: invalid origin '{0}'")]
    InvalidOrigin(String),

    #[error("observability.log_level: unknown level '{0}'")]
    InvalidLogLevel(String),

    #[error("admin.api_key: must be set to a non-placeholder value when the admin API is enabled")]
    WeakAdminKey,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &MirrorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.https_address", &config.listener.https_address);
    if let Some(addr) = &config.listener.http_address {
        check_address(&mut errors, "listener.http_address", addr);
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() || config.admin.api_key == ADMIN_KEY_PLACEHOLDER {
            errors.push(ValidationError::WeakAdminKey);
        }
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::NoRoutes);
    }
    let mut seen = HashSet::new();
    for route in &config.routes {
        if !is_valid_prefix(&route.prefix) {
            errors.push(ValidationError::InvalidPrefix(route.prefix.clone()));
            continue;
        }
        let canonical = route.prefix.trim_end_matches('/').to_string();
        if !seen.insert(canonical) {
            errors.push(ValidationError::DuplicatePrefix(route.prefix.clone()));
        }
    }

    for class in [RouteClass::Manifest, RouteClass::Download] {
        if !config.routes.iter().any(|r| r.class == class) {
            continue;
        }
        if config.root_for(class).map_or(true, |p| p.as_os_str().is_empty()) {
            errors.push(ValidationError::MissingRoot { class });
        }
        match config.ttl_for(class) {
            Some(ttl) if ttl.is_zero() => errors.push(ValidationError::ZeroTtl { class }),
            Some(ttl) if ttl.as_secs() > MAX_CACHE_TTL_SECS => {
                errors.push(ValidationError::TtlTooLong { class })
            }
            _ => {}
        }
        if let Some(bucket) = config.bucket_for(class) {
            check_bucket(&mut errors, class, bucket);
        }
    }

    if config.cache.enabled && config.cache.max_entries == 0 {
        errors.push(ValidationError::ZeroCacheEntries);
    }

    let server_name = &config.security.server_name;
    if server_name.is_empty()
        || server_name.contains('/')
        || !server_name.chars().all(|c| c.is_ascii_graphic() || c == ' ')
    {
        errors.push(ValidationError::InvalidServerName(server_name.clone()));
    }

    for origin in &config.cors.allowed_origins {
        if origin != "*" && !(origin.starts_with("http://") || origin.starts_with("https://")) {
            errors.push(ValidationError::InvalidOrigin(origin.clone()));
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ValidationError::InvalidLogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_bucket(errors: &mut Vec<ValidationError>, class: RouteClass, bucket: &BucketConfig) {
    let rps = bucket.requests_per_second;
    if !(MIN_REQUESTS_PER_SECOND..=MAX_REQUESTS_PER_SECOND).contains(&rps) {
        errors.push(ValidationError::InvalidBucket {
            class,
            reason: "requests_per_second must be between 0.001 and 1000000",
        });
    }
    if bucket.burst_size == 0 {
        errors.push(ValidationError::InvalidBucket {
            class,
            reason: "burst_size must be at least 1",
        });
    }
}

fn is_valid_prefix(prefix: &str) -> bool {
    prefix.starts_with('/')
        && !prefix.chars().any(|c| c.is_whitespace() || c == '\\')
        && !prefix.split('/').any(|seg| seg == "." || seg == "..")
}
