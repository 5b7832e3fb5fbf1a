//! Artifact root reachability.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use crate::resolver::StaticResolver;

/// Overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Reachability per route class (`manifest`, `download`).
    pub roots: BTreeMap<&'static str, bool>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.status == HealthStatus::Ok
    }
}

async fn reachable(root: &Path) -> bool {
    match tokio::fs::metadata(root).await {
        Ok(metadata) => metadata.is_dir(),
        Err(e) => {
            tracing::warn!(root = ?root, error = %e, "Artifact root unreachable");
            false
        }
    }
}

/// Stat every configured root.
pub async fn check(resolver: &StaticResolver) -> HealthReport {
    let mut roots = BTreeMap::new();
    for (class, root) in resolver.roots() {
        roots.insert(class.as_str(), reachable(root).await);
    }

    let status = if roots.values().all(|ok| *ok) {
        HealthStatus::Ok
    } else {
        HealthStatus::Degraded
    };
    HealthReport { status, roots }
}
