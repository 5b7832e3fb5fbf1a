//! Artifact cache subsystem.
//!
//! # Data Flow
//! ```text
//! Classified request
//!     → key(prefix, normalized path)
//!     → store.rs lookup: Hit (live entry) | Miss
//!     → on Miss the handler resolves and stores file resolutions only
//! ```
//!
//! # Design Decisions
//! - TTL depends only on the route class (policy.rs)
//! - Entries are immutable `Arc`s; an entry's expiry never moves
//! - Negative results are never cached
//! - Concurrent misses on one path may both resolve; last store wins

pub mod policy;
pub mod store;

pub use policy::{CachePolicy, NO_STORE};
pub use store::{ArtifactCache, CacheEntry, CacheSummary, ClassSummary};

use crate::resolver::NormalizedPath;

/// Cache key of a normalized path below a route prefix.
pub fn cache_key(prefix: &str, path: &NormalizedPath) -> String {
    let prefix = prefix.trim_end_matches('/');
    if path.is_root() {
        format!("{prefix}/")
    } else {
        format!("{prefix}/{}", path.as_key())
    }
}
