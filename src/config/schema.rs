//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mirror.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::routing::RouteClass;

/// Root configuration for the mirror server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Listener configuration (HTTPS, redirect port).
    pub listener: ListenerConfig,

    /// Certificate and key consumed at startup/reload.
    pub tls: TlsConfig,

    /// Route table mapping URL prefixes to route classes.
    pub routes: Vec<RouteConfig>,

    /// Manifest class policy.
    pub manifest: ManifestConfig,

    /// Download class policy.
    pub download: DownloadConfig,

    /// Cache layer settings.
    pub cache: CacheConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Allowed CORS origins for manifest and download routes.
    pub cors: CorsConfig,

    /// Security response headers.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    pub lifecycle: LifecycleConfig,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            tls: TlsConfig::default(),
            routes: RouteConfig::defaults(),
            manifest: ManifestConfig::default(),
            download: DownloadConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cors: CorsConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl MirrorConfig {
    /// Artifact root for a route class. Health has none.
    pub fn root_for(&self, class: RouteClass) -> Option<&Path> {
        match class {
            RouteClass::Manifest => Some(self.manifest.root.as_path()),
            RouteClass::Download => Some(self.download.root.as_path()),
            RouteClass::Health => None,
        }
    }

    /// Cache TTL for a route class. Health is never cached.
    pub fn ttl_for(&self, class: RouteClass) -> Option<Duration> {
        match class {
            RouteClass::Manifest => Some(Duration::from_secs(self.manifest.cache_ttl_secs)),
            RouteClass::Download => Some(Duration::from_secs(self.download.cache_ttl_secs)),
            RouteClass::Health => None,
        }
    }

    /// Token bucket parameters for a route class. Health is never limited.
    pub fn bucket_for(&self, class: RouteClass) -> Option<&BucketConfig> {
        match class {
            RouteClass::Manifest => Some(&self.manifest.rate_limit),
            RouteClass::Download => Some(&self.download.rate_limit),
            RouteClass::Health => None,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// HTTPS bind address (e.g., "0.0.0.0:443").
    pub https_address: String,

    /// Plain-HTTP bind address answering with redirects. `None` disables it.
    pub http_address: Option<String>,

    /// Host used in redirects when the request carries no usable Host header.
    pub public_host: Option<String>,

    /// HTTPS port advertised in redirects, when it differs from the bound
    /// port (e.g. behind a container port mapping).
    pub public_https_port: Option<u16>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            https_address: "0.0.0.0:443".to_string(),
            http_address: Some("0.0.0.0:80".to_string()),
            public_host: None,
            public_https_port: None,
        }
    }
}

/// TLS configuration for the HTTPS listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,

    /// Refuse to start when the key is readable by group or others.
    pub check_key_permissions: bool,

    /// Reload the certificate when the files change on disk.
    pub watch: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("certs/mirror.crt"),
            key_path: PathBuf::from("certs/mirror.key"),
            check_key_permissions: true,
            watch: true,
        }
    }
}

/// Route configuration mapping a URL prefix to a route class.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Path prefix to match (segment boundary, longest wins).
    pub prefix: String,

    /// Class of requests under this prefix.
    pub class: RouteClass,
}

impl RouteConfig {
    /// The standard mirror layout.
    pub fn defaults() -> Vec<RouteConfig> {
        vec![
            RouteConfig {
                prefix: "/manifests".to_string(),
                class: RouteClass::Manifest,
            },
            RouteConfig {
                prefix: "/downloads".to_string(),
                class: RouteClass::Download,
            },
            RouteConfig {
                prefix: "/health".to_string(),
                class: RouteClass::Health,
            },
        ]
    }
}

/// Token bucket parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BucketConfig {
    /// Sustained refill rate.
    pub requests_per_second: f64,

    /// Burst capacity (maximum tokens).
    pub burst_size: u32,
}

/// Manifest class policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Root of the patched manifest tree.
    pub root: PathBuf,

    /// Cache TTL in seconds. Manifests may be re-patched, so keep it short.
    pub cache_ttl_secs: u64,

    /// Allow HTML index pages for manifest directories.
    pub directory_listing: bool,

    pub rate_limit: BucketConfig,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("mirror/patched-manifests/manifests"),
            cache_ttl_secs: 3600,
            directory_listing: true,
            rate_limit: BucketConfig {
                requests_per_second: 20.0,
                burst_size: 40,
            },
        }
    }
}

/// Download class policy. Directories are never listed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Root of the installer tree.
    pub root: PathBuf,

    /// Cache TTL in seconds. Installers are immutable once published.
    pub cache_ttl_secs: u64,

    pub rate_limit: BucketConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("mirror/downloads"),
            cache_ttl_secs: 31_536_000,
            rate_limit: BucketConfig {
                requests_per_second: 2.0,
                burst_size: 10,
            },
        }
    }
}

/// Cache layer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Upper bound on cached paths.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 100_000,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Key buckets by client IP in addition to route class.
    pub per_client: bool,

    /// Tracked buckets before full (idle) buckets are dropped.
    pub max_tracked_buckets: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_client: true,
            max_tracked_buckets: 100_000,
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// `["*"]` allows any origin; otherwise exact origins.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// `Strict-Transport-Security` max-age in seconds.
    pub hsts_max_age_secs: u64,

    pub hsts_include_subdomains: bool,

    /// `Server` header value. Must not carry a version.
    pub server_name: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            hsts_max_age_secs: 31_536_000,
            hsts_include_subdomains: false,
            server_name: "winget-mirror".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Placeholder key rejected by validation when the admin API is enabled.
pub const ADMIN_KEY_PLACEHOLDER: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: ADMIN_KEY_PLACEHOLDER.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Process lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Time in-flight requests get to finish after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_secs: 10,
        }
    }
}
