//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → MirrorConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only TLS material is reloaded at runtime
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, BucketConfig, CacheConfig, CorsConfig, DownloadConfig, LifecycleConfig,
    ListenerConfig, LogFormat, ManifestConfig, MirrorConfig, ObservabilityConfig,
    RateLimitConfig, RouteConfig, SecurityConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
