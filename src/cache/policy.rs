//! Per-class freshness policy.

use std::time::Duration;

use crate::config::MirrorConfig;
use crate::routing::RouteClass;

/// TTLs and `Cache-Control` values by route class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    manifest_ttl: Duration,
    download_ttl: Duration,
}

impl CachePolicy {
    pub fn new(manifest_ttl: Duration, download_ttl: Duration) -> Self {
        Self {
            manifest_ttl,
            download_ttl,
        }
    }

    pub fn from_config(config: &MirrorConfig) -> Self {
        Self::new(
            Duration::from_secs(config.manifest.cache_ttl_secs),
            Duration::from_secs(config.download.cache_ttl_secs),
        )
    }

    /// TTL for the class; `None` means never cached.
    pub fn ttl(&self, class: RouteClass) -> Option<Duration> {
        match class {
            RouteClass::Manifest => Some(self.manifest_ttl),
            RouteClass::Download => Some(self.download_ttl),
            RouteClass::Health => None,
        }
    }

    /// `Cache-Control` sent with successful responses of the class.
    ///
    /// Downloads are versioned paths and never change once published.
    pub fn cache_control(&self, class: RouteClass) -> String {
        match class {
            RouteClass::Manifest => format!("public, max-age={}", self.manifest_ttl.as_secs()),
            RouteClass::Download => {
                format!("public, max-age={}, immutable", self.download_ttl.as_secs())
            }
            RouteClass::Health => NO_STORE.to_string(),
        }
    }
}

/// `Cache-Control` for health checks and error responses.
pub const NO_STORE: &str = "no-store";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_control_by_class() {
        let policy = CachePolicy::from_config(&MirrorConfig::default());
        assert_eq!(policy.cache_control(RouteClass::Manifest), "public, max-age=3600");
        assert_eq!(
            policy.cache_control(RouteClass::Download),
            "public, max-age=31536000, immutable"
        );
        assert_eq!(policy.cache_control(RouteClass::Health), "no-store");
        assert_eq!(policy.ttl(RouteClass::Health), None);
    }
}
