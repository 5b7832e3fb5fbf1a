//! Request path normalization.
//!
//! Percent-decoding happens first so that encoded separators and dots are
//! normalized like literal ones. `.` segments and empty segments are dropped,
//! `..` pops the previous segment; a `..` that would climb above the root is
//! kept as a violation.

use std::path::PathBuf;

use percent_encoding::percent_decode_str;

use crate::resolver::ResolveError;

/// A request path reduced to plain, safe segments relative to a root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedPath {
    segments: Vec<String>,
}

impl NormalizedPath {
    /// Segments joined with `/`, without leading or trailing slash.
    pub fn as_key(&self) -> String {
        self.segments.join("/")
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when the path addresses the root itself.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Relative filesystem path.
    pub fn to_relative(&self) -> PathBuf {
        self.segments.iter().collect()
    }
}

/// Normalize a raw (percent-encoded) request path.
pub fn normalize(raw: &str) -> Result<NormalizedPath, ResolveError> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ResolveError::Forbidden("path is not valid UTF-8"))?;

    if decoded.contains('\0') || decoded.contains('\\') {
        return Err(ResolveError::Forbidden("path contains forbidden characters"));
    }

    let mut segments: Vec<String> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(ResolveError::Forbidden("path escapes the route root"));
                }
            }
            other => segments.push(other.to_string()),
        }
    }

    if segments.iter().any(|s| is_hidden(s)) {
        return Err(ResolveError::Forbidden("dotfile access denied"));
    }

    Ok(NormalizedPath { segments })
}

/// Dotfiles and dot-directories are never served.
pub fn is_hidden(segment: &str) -> bool {
    segment.starts_with('.')
}
