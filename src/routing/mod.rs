//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (longest-prefix lookup)
//!     → matcher.rs (segment-aware prefix test)
//!     → Return: ClassifiedRequest or NoMatch
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Sort by prefix length (longest first)
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Classification is a pure function of the URL prefix
//! - Explicit NoMatch rather than silent default

pub mod matcher;
pub mod router;

use serde::{Deserialize, Serialize};

pub use router::{RouteMatch, RouteTable};

/// Policy grouping assigned to a request by its URL prefix.
///
/// The class decides the cache TTL, the rate-limit bucket and whether
/// directories may be listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteClass {
    /// Manifest documents (`/manifests`). Short TTL, listing allowed.
    Manifest,
    /// Installer binaries (`/downloads`). Long TTL, never listed.
    Download,
    /// Liveness/readiness probe (`/health`). No limits, no cache.
    Health,
}

impl RouteClass {
    /// Stable lowercase label used in logs, metrics and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Manifest => "manifest",
            RouteClass::Download => "download",
            RouteClass::Health => "health",
        }
    }

    /// Classes that serve artifacts from a root directory.
    pub fn serves_artifacts(&self) -> bool {
        !matches!(self, RouteClass::Health)
    }
}

impl std::fmt::Display for RouteClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing decision attached to the request extensions by the
/// classification middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRequest {
    pub class: RouteClass,
    /// Configured prefix that matched (e.g. `/manifests`).
    pub prefix: String,
    /// Raw (still percent-encoded) path after the prefix.
    pub remainder: String,
}

impl From<RouteMatch<'_>> for ClassifiedRequest {
    fn from(m: RouteMatch<'_>) -> Self {
        Self {
            class: m.class,
            prefix: m.prefix.to_string(),
            remainder: m.remainder.to_string(),
        }
    }
}
