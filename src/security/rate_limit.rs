//! Per-class token bucket rate limiting.
//!
//! # Responsibilities
//! - One bucket per route class, optionally per client IP
//! - Lazy refill by timestamp on every admission check
//! - Reject with the wait until the next token
//!
//! # Design Decisions
//! - Buckets live in a sharded map; unrelated clients never share a lock
//! - No background sweeper: full buckets are pruned on the admitting path
//!   once the tracked count exceeds its bound, at most once per interval
//! - Health checks never touch a bucket

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::{BucketConfig, MirrorConfig};
use crate::error::MirrorError;
use crate::observability::metrics;
use crate::routing::{ClassifiedRequest, RouteClass};

/// Minimum spacing between prunes of an oversized bucket map.
const PRUNE_INTERVAL: Duration = Duration::from_secs(1);

const NEVER: u64 = u64::MAX;

/// A token bucket refilled lazily from elapsed time.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn refill(&mut self, limit: &Limit, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * limit.refill_rate).min(limit.capacity);
        self.last_update = now;
    }

    /// Take one token, or report how long until one is available.
    fn try_acquire(&mut self, limit: &Limit, now: Instant) -> Result<(), Duration> {
        self.refill(limit, now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::try_from_secs_f64(missing / limit.refill_rate).unwrap_or(Duration::MAX))
        }
    }

    /// True when the bucket holds as many tokens as a fresh one would.
    fn is_full(&self, limit: &Limit, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens + elapsed * limit.refill_rate >= limit.capacity
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Limit {
    refill_rate: f64,
    capacity: f64,
}

impl From<&BucketConfig> for Limit {
    fn from(config: &BucketConfig) -> Self {
        Self {
            refill_rate: config.requests_per_second,
            capacity: f64::from(config.burst_size),
        }
    }
}

/// Identity of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub class: RouteClass,
    /// `None` when all clients share the class bucket.
    pub client: Option<IpAddr>,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { retry_after: Duration },
}

#[derive(Debug, Default)]
struct DecisionCounters {
    allowed: AtomicU64,
    denied: AtomicU64,
}

/// Admin view of one class.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClassLimitSummary {
    pub requests_per_second: f64,
    pub burst_size: f64,
    pub allowed: u64,
    pub denied: u64,
}

/// Admin view of the limiter.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RateLimitSummary {
    pub enabled: bool,
    pub per_client: bool,
    pub tracked_buckets: usize,
    pub max_tracked_buckets: usize,
    pub manifest: ClassLimitSummary,
    pub download: ClassLimitSummary,
}

/// Shared rate limiter state.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<BucketKey, TokenBucket>,
    manifest: Limit,
    download: Limit,
    enabled: bool,
    per_client: bool,
    max_tracked_buckets: usize,
    manifest_counters: DecisionCounters,
    download_counters: DecisionCounters,
    epoch: Instant,
    last_prune_ms: AtomicU64,
    prunes: AtomicU64,
}

impl RateLimiter {
    pub fn from_config(config: &MirrorConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            manifest: Limit::from(&config.manifest.rate_limit),
            download: Limit::from(&config.download.rate_limit),
            enabled: config.rate_limit.enabled,
            per_client: config.rate_limit.per_client,
            max_tracked_buckets: config.rate_limit.max_tracked_buckets,
            manifest_counters: DecisionCounters::default(),
            download_counters: DecisionCounters::default(),
            epoch: Instant::now(),
            last_prune_ms: AtomicU64::new(NEVER),
            prunes: AtomicU64::new(0),
        }
    }

    fn limit(&self, class: RouteClass) -> Option<&Limit> {
        match class {
            RouteClass::Manifest => Some(&self.manifest),
            RouteClass::Download => Some(&self.download),
            RouteClass::Health => None,
        }
    }

    fn counters(&self, class: RouteClass) -> Option<&DecisionCounters> {
        match class {
            RouteClass::Manifest => Some(&self.manifest_counters),
            RouteClass::Download => Some(&self.download_counters),
            RouteClass::Health => None,
        }
    }

    pub fn key_for(&self, class: RouteClass, client: IpAddr) -> BucketKey {
        BucketKey {
            class,
            client: self.per_client.then_some(client),
        }
    }

    pub fn admit(&self, class: RouteClass, client: IpAddr) -> Decision {
        self.admit_at(class, client, Instant::now())
    }

    /// Charge one request against the bucket of `(class, client)` at `now`.
    pub fn admit_at(&self, class: RouteClass, client: IpAddr, now: Instant) -> Decision {
        if !self.enabled {
            return Decision::Allowed;
        }
        let (Some(limit), Some(counters)) = (self.limit(class), self.counters(class)) else {
            return Decision::Allowed;
        };
        let key = self.key_for(class, client);

        if !self.buckets.contains_key(&key) && self.buckets.len() >= self.max_tracked_buckets {
            self.prune_full(now);
        }

        let result = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(limit.capacity, now))
            .try_acquire(limit, now);

        match result {
            Ok(()) => {
                counters.allowed.fetch_add(1, Ordering::Relaxed);
                Decision::Allowed
            }
            Err(retry_after) => {
                counters.denied.fetch_add(1, Ordering::Relaxed);
                Decision::Denied { retry_after }
            }
        }
    }

    /// Drop buckets that have refilled to capacity, unless a prune ran
    /// within the last `PRUNE_INTERVAL`.
    fn prune_full(&self, now: Instant) {
        let now_ms = u64::try_from(now.saturating_duration_since(self.epoch).as_millis())
            .unwrap_or(NEVER - 1);
        let last = self.last_prune_ms.load(Ordering::Relaxed);
        if last != NEVER && now_ms.saturating_sub(last) < PRUNE_INTERVAL.as_millis() as u64 {
            return;
        }
        if self
            .last_prune_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.prunes.fetch_add(1, Ordering::Relaxed);

        let before = self.buckets.len();
        self.buckets.retain(|key, bucket| match self.limit(key.class) {
            Some(limit) => !bucket.is_full(limit, now),
            None => false,
        });
        tracing::debug!(
            before,
            after = self.buckets.len(),
            "Pruned idle rate limit buckets"
        );
    }

    pub fn tracked_buckets(&self) -> usize {
        self.buckets.len()
    }

    pub fn summary(&self) -> RateLimitSummary {
        let class = |limit: &Limit, counters: &DecisionCounters| ClassLimitSummary {
            requests_per_second: limit.refill_rate,
            burst_size: limit.capacity,
            allowed: counters.allowed.load(Ordering::Relaxed),
            denied: counters.denied.load(Ordering::Relaxed),
        };
        RateLimitSummary {
            enabled: self.enabled,
            per_client: self.per_client,
            tracked_buckets: self.buckets.len(),
            max_tracked_buckets: self.max_tracked_buckets,
            manifest: class(&self.manifest, &self.manifest_counters),
            download: class(&self.download, &self.download_counters),
        }
    }
}

/// Middleware charging classified requests against their class bucket.
///
/// Only GET and HEAD are charged. Unclassified requests, health checks,
/// CORS preflights and methods the handler rejects pass through.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(class) = request.extensions().get::<ClassifiedRequest>().map(|c| c.class) else {
        return next.run(request).await;
    };
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return next.run(request).await;
    }

    match limiter.admit(class, addr.ip()) {
        Decision::Allowed => next.run(request).await,
        Decision::Denied { retry_after } => {
            tracing::warn!(
                client = %addr.ip(),
                class = %class,
                path = %request.uri().path(),
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(class.as_str());
            MirrorError::RateLimited { retry_after }.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn limiter(rps: f64, burst: u32) -> RateLimiter {
        let mut config = MirrorConfig::default();
        config.download.rate_limit = BucketConfig {
            requests_per_second: rps,
            burst_size: burst,
        };
        RateLimiter::from_config(&config)
    }

    const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    #[test]
    fn burst_then_denied() {
        let limiter = limiter(2.0, 5);
        let now = Instant::now();
        for _ in 0..5 {
            assert_eq!(limiter.admit_at(RouteClass::Download, CLIENT, now), Decision::Allowed);
        }
        assert!(matches!(
            limiter.admit_at(RouteClass::Download, CLIENT, now),
            Decision::Denied { .. }
        ));
    }

    #[test]
    fn denial_reports_time_to_next_token() {
        let limiter = limiter(2.0, 1);
        let now = Instant::now();
        limiter.admit_at(RouteClass::Download, CLIENT, now);
        assert_eq!(
            limiter.admit_at(RouteClass::Download, CLIENT, now),
            Decision::Denied {
                retry_after: Duration::from_millis(500)
            }
        );
    }

    #[test]
    fn refills_from_elapsed_time_up_to_burst() {
        let limiter = limiter(2.0, 2);
        let t0 = Instant::now();
        limiter.admit_at(RouteClass::Download, CLIENT, t0);
        limiter.admit_at(RouteClass::Download, CLIENT, t0);

        let t1 = t0 + Duration::from_millis(500);
        assert_eq!(limiter.admit_at(RouteClass::Download, CLIENT, t1), Decision::Allowed);
        assert!(matches!(
            limiter.admit_at(RouteClass::Download, CLIENT, t1),
            Decision::Denied { .. }
        ));

        // A long idle period never yields more than the burst.
        let t2 = t1 + Duration::from_secs(3600);
        for _ in 0..2 {
            assert_eq!(limiter.admit_at(RouteClass::Download, CLIENT, t2), Decision::Allowed);
        }
        assert!(matches!(
            limiter.admit_at(RouteClass::Download, CLIENT, t2),
            Decision::Denied { .. }
        ));
    }

    #[test]
    fn classes_and_clients_are_independent() {
        let limiter = limiter(1.0, 1);
        let now = Instant::now();
        assert_eq!(limiter.admit_at(RouteClass::Download, CLIENT, now), Decision::Allowed);
        assert_eq!(limiter.admit_at(RouteClass::Download, OTHER, now), Decision::Allowed);
        assert_eq!(limiter.admit_at(RouteClass::Manifest, CLIENT, now), Decision::Allowed);
    }

    #[test]
    fn shared_bucket_without_per_client() {
        let mut config = MirrorConfig::default();
        config.rate_limit.per_client = false;
        config.download.rate_limit.burst_size = 1;
        let limiter = RateLimiter::from_config(&config);
        let now = Instant::now();
        assert_eq!(limiter.admit_at(RouteClass::Download, CLIENT, now), Decision::Allowed);
        assert!(matches!(
            limiter.admit_at(RouteClass::Download, OTHER, now),
            Decision::Denied { .. }
        ));
    }

    #[test]
    fn health_is_never_limited() {
        let limiter = limiter(1.0, 1);
        let now = Instant::now();
        for _ in 0..10 {
            assert_eq!(limiter.admit_at(RouteClass::Health, CLIENT, now), Decision::Allowed);
        }
        assert_eq!(limiter.tracked_buckets(), 0);
    }

    #[test]
    fn full_buckets_are_pruned_past_the_bound() {
        let mut config = MirrorConfig::default();
        config.rate_limit.max_tracked_buckets = 2;
        config.download.rate_limit = BucketConfig {
            requests_per_second: 1.0,
            burst_size: 1,
        };
        let limiter = RateLimiter::from_config(&config);
        let t0 = Instant::now();
        limiter.admit_at(RouteClass::Download, CLIENT, t0);
        limiter.admit_at(RouteClass::Download, OTHER, t0);
        assert_eq!(limiter.tracked_buckets(), 2);

        let later = t0 + Duration::from_secs(5);
        let third = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3));
        assert_eq!(limiter.admit_at(RouteClass::Download, third, later), Decision::Allowed);
        assert_eq!(limiter.tracked_buckets(), 1);
    }

    #[test]
    fn saturated_map_is_pruned_at_most_once_per_interval() {
        let mut config = MirrorConfig::default();
        config.rate_limit.max_tracked_buckets = 1;
        config.download.rate_limit = BucketConfig {
            requests_per_second: 1.0,
            burst_size: 1,
        };
        let limiter = RateLimiter::from_config(&config);
        let t0 = Instant::now();
        for i in 0..50 {
            let client = IpAddr::V4(Ipv4Addr::new(10, 1, 0, i));
            assert_eq!(limiter.admit_at(RouteClass::Download, client, t0), Decision::Allowed);
        }
        assert_eq!(limiter.prunes.load(Ordering::Relaxed), 1);
        assert_eq!(limiter.tracked_buckets(), 50);

        let later = t0 + PRUNE_INTERVAL;
        limiter.admit_at(RouteClass::Download, IpAddr::V4(Ipv4Addr::new(10, 2, 0, 1)), later);
        assert_eq!(limiter.prunes.load(Ordering::Relaxed), 2);
        assert_eq!(limiter.tracked_buckets(), 1);
    }

    #[test]
    fn tiny_refill_rate_saturates_retry_after() {
        let limiter = limiter(1e-30, 1);
        let now = Instant::now();
        assert_eq!(limiter.admit_at(RouteClass::Download, CLIENT, now), Decision::Allowed);
        assert_eq!(
            limiter.admit_at(RouteClass::Download, CLIENT, now),
            Decision::Denied {
                retry_after: Duration::MAX
            }
        );
    }

    #[test]
    fn summary_counts_decisions() {
        let limiter = limiter(1.0, 1);
        let now = Instant::now();
        limiter.admit_at(RouteClass::Download, CLIENT, now);
        limiter.admit_at(RouteClass::Download, CLIENT, now);
        let summary = limiter.summary();
        assert_eq!(summary.download.allowed, 1);
        assert_eq!(summary.download.denied, 1);
        assert_eq!(summary.tracked_buckets, 1);
    }

    #[test]
    fn disabled_limiter_admits_everything() {
        let mut config = MirrorConfig::default();
        config.rate_limit.enabled = false;
        config.download.rate_limit.burst_size = 1;
        let limiter = RateLimiter::from_config(&config);
        let now = Instant::now();
        for _ in 0..5 {
            assert_eq!(limiter.admit_at(RouteClass::Download, CLIENT, now), Decision::Allowed);
        }
    }
}
