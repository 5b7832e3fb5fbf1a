//! Conditional and range request evaluation (RFC 9110 §13, §14).

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap};

use crate::resolver::ArtifactMeta;

/// Outcome of `If-None-Match` / `If-Modified-Since`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Proceed,
    NotModified,
}

/// Byte range selected for a file response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    Full,
    /// Inclusive bounds.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

impl RangeRequest {
    pub fn content_range(&self, len: u64) -> Option<String> {
        match self {
            RangeRequest::Partial { start, end } => Some(format!("bytes {start}-{end}/{len}")),
            _ => None,
        }
    }
}

fn secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

fn opaque(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

/// Weak comparison of an `If-None-Match` list against `etag`.
fn none_match(list: &str, etag: &str) -> bool {
    list.split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || opaque(candidate) == opaque(etag))
}

/// `If-None-Match` wins; `If-Modified-Since` is only consulted without it.
pub fn evaluate(headers: &HeaderMap, meta: &ArtifactMeta) -> Precondition {
    if let Some(value) = headers.get(header::IF_NONE_MATCH) {
        let matched = value.to_str().is_ok_and(|list| none_match(list, &meta.etag));
        return if matched {
            Precondition::NotModified
        } else {
            Precondition::Proceed
        };
    }

    let since = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok());
    match since {
        Some(since) if secs(meta.modified) <= secs(since) => Precondition::NotModified,
        _ => Precondition::Proceed,
    }
}

/// `If-Range` holds when it names the current strong ETag or exact date.
fn if_range_holds(headers: &HeaderMap, meta: &ArtifactMeta) -> bool {
    let Some(value) = headers.get(header::IF_RANGE).and_then(|v| v.to_str().ok()) else {
        return true;
    };
    let value = value.trim();
    if value.starts_with('"') {
        return value == meta.etag;
    }
    if value.starts_with("W/") {
        return false;
    }
    httpdate::parse_http_date(value).is_ok_and(|date| secs(date) == secs(meta.modified))
}

/// Pick the range to serve for a GET of `meta`.
pub fn select_range(headers: &HeaderMap, meta: &ArtifactMeta) -> RangeRequest {
    let Some(value) = headers.get(header::RANGE).and_then(|v| v.to_str().ok()) else {
        return RangeRequest::Full;
    };
    if !if_range_holds(headers, meta) {
        return RangeRequest::Full;
    }
    parse_range(value, meta.len)
}

/// Parse a single `bytes=` range. Multi-range and malformed values yield
/// `Full`; the header is then ignored.
pub fn parse_range(value: &str, len: u64) -> RangeRequest {
    let Some(spec) = value.trim().strip_prefix("bytes=") else {
        return RangeRequest::Full;
    };
    if spec.contains(',') {
        return RangeRequest::Full;
    }
    let Some((first, last)) = spec.trim().split_once('-') else {
        return RangeRequest::Full;
    };

    if first.is_empty() {
        // Suffix range: the last `n` bytes.
        let Ok(n) = last.parse::<u64>() else {
            return RangeRequest::Full;
        };
        if n == 0 || len == 0 {
            return RangeRequest::Unsatisfiable;
        }
        return RangeRequest::Partial {
            start: len.saturating_sub(n),
            end: len - 1,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return RangeRequest::Full;
    };
    let end = if last.is_empty() {
        None
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => Some(end),
            _ => return RangeRequest::Full,
        }
    };

    if start >= len {
        return RangeRequest::Unsatisfiable;
    }
    let end = end.map_or(len - 1, |e| e.min(len - 1));
    RangeRequest::Partial { start, end }
}
