use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::cache::{cache_key, CacheSummary};
use crate::error::MirrorError;
use crate::http::SharedState;
use crate::resolver::normalize;
use crate::security::rate_limit::RateLimitSummary;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub active_transfers: u64,
    pub aborted_transfers: u64,
    pub cache_entries: usize,
    pub tracked_buckets: usize,
}

/// Body of `POST /admin/cache/purge`. An empty body purges everything.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgeRequest {
    /// One request path, e.g. `/manifests/foo/1.0.0/foo.yaml`.
    pub path: Option<String>,
    /// Every cached path under this prefix.
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurgeResult {
    pub scope: String,
    pub purged: usize,
}

pub async fn get_status(State(state): State<SharedState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        active_transfers: state.transfers.active_count(),
        aborted_transfers: state.transfers.aborted_count(),
        cache_entries: state.cache.len(),
        tracked_buckets: state.limiter.tracked_buckets(),
    })
}

pub async fn get_cache(State(state): State<SharedState>) -> Json<CacheSummary> {
    Json(state.cache.summary())
}

pub async fn get_rate_limits(State(state): State<SharedState>) -> Json<RateLimitSummary> {
    Json(state.limiter.summary())
}

pub async fn purge_cache(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<PurgeResult>, MirrorError> {
    let request: PurgeRequest = if body.iter().all(u8::is_ascii_whitespace) {
        PurgeRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| MirrorError::BadRequest(e.to_string()))?
    };

    let result = match (request.path, request.prefix) {
        (Some(_), Some(_)) => {
            return Err(MirrorError::BadRequest(
                "give either path or prefix, not both".into(),
            ))
        }
        (Some(path), None) => {
            let key = purge_key(&state, &path)?;
            let purged = usize::from(state.cache.purge(&key));
            PurgeResult { scope: key, purged }
        }
        (None, Some(prefix)) => {
            if !prefix.starts_with('/') {
                return Err(MirrorError::BadRequest("prefix must start with '/'".into()));
            }
            let purged = state.cache.purge_prefix(&prefix);
            PurgeResult { scope: prefix, purged }
        }
        (None, None) => PurgeResult {
            scope: "*".into(),
            purged: state.cache.purge_all(),
        },
    };

    tracing::info!(scope = %result.scope, purged = result.purged, "Cache purged");
    Ok(Json(result))
}

/// Map a request path to the key the handler caches it under.
fn purge_key(state: &SharedState, path: &str) -> Result<String, MirrorError> {
    let matched = state
        .routes
        .match_path(path)
        .ok_or_else(|| MirrorError::BadRequest(format!("{path} matches no route")))?;
    let normalized =
        normalize(matched.remainder).map_err(|e| MirrorError::BadRequest(e.to_string()))?;
    Ok(cache_key(matched.prefix, &normalized))
}
