//! Concurrent artifact cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::cache::policy::CachePolicy;
use crate::observability::metrics;
use crate::resolver::{ArtifactMeta, ArtifactReference};
use crate::routing::RouteClass;

/// Longest lifetime an entry can get, whatever the configured TTL.
const MAX_ENTRY_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Minimum spacing between expiry sweeps of a full cache.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Sentinel for "never swept".
const NEVER: u64 = u64::MAX;

/// A resolved file and its validators. Immutable; replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub artifact: ArtifactReference,
    pub meta: ArtifactMeta,
    pub stored_at: Instant,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
struct ClassCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ClassCounters {
    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of the cache for the admin API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheSummary {
    pub enabled: bool,
    pub entries: usize,
    pub expired: usize,
    pub max_entries: usize,
    pub manifest: ClassSummary,
    pub download: ClassSummary,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ClassSummary {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Maps normalized request paths to cached file resolutions.
#[derive(Debug)]
pub struct ArtifactCache {
    entries: DashMap<String, Arc<CacheEntry>>,
    policy: CachePolicy,
    enabled: bool,
    max_entries: usize,
    manifest: ClassCounters,
    download: ClassCounters,
    epoch: Instant,
    /// Milliseconds after `epoch` of the last sweep, or `NEVER`.
    last_sweep_ms: AtomicU64,
    sweeps: AtomicU64,
}

impl ArtifactCache {
    pub fn new(policy: CachePolicy, enabled: bool, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
            enabled,
            max_entries,
            manifest: ClassCounters::default(),
            download: ClassCounters::default(),
            epoch: Instant::now(),
            last_sweep_ms: AtomicU64::new(NEVER),
            sweeps: AtomicU64::new(0),
        }
    }

    /// Claim the right to sweep at `now`. At most one caller wins per
    /// `SWEEP_INTERVAL`.
    fn claim_sweep(&self, now: Instant) -> bool {
        let now_ms = u64::try_from(now.saturating_duration_since(self.epoch).as_millis())
            .unwrap_or(NEVER - 1);
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if last != NEVER && now_ms.saturating_sub(last) < SWEEP_INTERVAL.as_millis() as u64 {
            return false;
        }
        self.last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    fn counters(&self, class: RouteClass) -> Option<&ClassCounters> {
        match class {
            RouteClass::Manifest => Some(&self.manifest),
            RouteClass::Download => Some(&self.download),
            RouteClass::Health => None,
        }
    }

    pub fn lookup(&self, class: RouteClass, key: &str) -> Option<Arc<CacheEntry>> {
        self.lookup_at(class, key, Instant::now())
    }

    /// Look up `key` as of `now`. Expired entries are removed and miss.
    pub fn lookup_at(&self, class: RouteClass, key: &str, now: Instant) -> Option<Arc<CacheEntry>> {
        let counters = self.counters(class)?;

        let found = if self.enabled {
            // Clone out so the shard guard is released before any removal.
            self.entries.get(key).map(|e| Arc::clone(e.value()))
        } else {
            None
        };

        let hit = match found {
            Some(entry) if !entry.is_expired(now) => Some(entry),
            Some(_) => {
                self.entries.remove_if(key, |_, e| e.is_expired(now));
                metrics::set_cache_entries(self.entries.len());
                None
            }
            None => None,
        };

        counters.record(hit.is_some());
        metrics::record_cache_lookup(class.as_str(), hit.is_some());
        tracing::trace!(class = %class, key, hit = hit.is_some(), "Cache lookup");
        hit
    }

    pub fn store(
        &self,
        key: String,
        artifact: ArtifactReference,
        meta: ArtifactMeta,
    ) -> Option<Arc<CacheEntry>> {
        self.store_at(key, artifact, meta, Instant::now())
    }

    /// Cache a file resolution with the TTL of its class.
    ///
    /// Returns the stored entry, or `None` when caching is disabled, the
    /// class is never cached, or the cache is full of live entries.
    pub fn store_at(
        &self,
        key: String,
        artifact: ArtifactReference,
        meta: ArtifactMeta,
        now: Instant,
    ) -> Option<Arc<CacheEntry>> {
        if !self.enabled {
            return None;
        }
        let ttl = self.policy.ttl(artifact.class)?;

        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            if self.claim_sweep(now) {
                self.sweeps.fetch_add(1, Ordering::Relaxed);
                self.entries.retain(|_, e| !e.is_expired(now));
            }
            if self.entries.len() >= self.max_entries {
                tracing::debug!(key = %key, max_entries = self.max_entries, "Cache full, not storing");
                return None;
            }
        }

        let entry = Arc::new(CacheEntry {
            artifact,
            meta,
            stored_at: now,
            expires_at: now.checked_add(ttl.min(MAX_ENTRY_TTL)).unwrap_or(now),
        });
        self.entries.insert(key, Arc::clone(&entry));
        metrics::set_cache_entries(self.entries.len());
        Some(entry)
    }

    /// Drop one path. Returns whether it was cached.
    pub fn purge(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        metrics::set_cache_entries(self.entries.len());
        removed
    }

    /// Drop every path under `prefix` (segment boundary). Returns the count.
    pub fn purge_prefix(&self, prefix: &str) -> usize {
        let prefix = prefix.trim_end_matches('/');
        let before = self.entries.len();
        self.entries.retain(|key, _| {
            let under = key
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
            !under
        });
        metrics::set_cache_entries(self.entries.len());
        before.saturating_sub(self.entries.len())
    }

    /// Drop everything. Returns the count.
    pub fn purge_all(&self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        metrics::set_cache_entries(0);
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> CacheSummary {
        self.summary_at(Instant::now())
    }

    pub fn summary_at(&self, now: Instant) -> CacheSummary {
        let mut manifest = ClassSummary::default();
        let mut download = ClassSummary::default();
        let mut expired = 0;
        for entry in self.entries.iter() {
            if entry.is_expired(now) {
                expired += 1;
            }
            match entry.artifact.class {
                RouteClass::Manifest => manifest.entries += 1,
                RouteClass::Download => download.entries += 1,
                RouteClass::Health => {}
            }
        }
        manifest.hits = self.manifest.hits.load(Ordering::Relaxed);
        manifest.misses = self.manifest.misses.load(Ordering::Relaxed);
        download.hits = self.download.hits.load(Ordering::Relaxed);
        download.misses = self.download.misses.load(Ordering::Relaxed);

        CacheSummary {
            enabled: self.enabled,
            entries: manifest.entries + download.entries,
            expired,
            max_entries: self.max_entries,
            manifest,
            download,
        }
    }
}
