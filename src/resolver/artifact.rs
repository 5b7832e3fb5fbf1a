//! Resolved artifacts and their HTTP-facing metadata.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::routing::RouteClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    File,
    Directory,
}

/// A root-checked, canonical filesystem location. Read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    pub class: RouteClass,
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

/// Validators and representation metadata of a file artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMeta {
    pub len: u64,
    pub modified: SystemTime,
    pub etag: String,
    pub content_type: String,
}

impl ArtifactMeta {
    /// Derive metadata from a file's path and `stat` result.
    pub fn from_metadata(path: &Path, metadata: &Metadata) -> Self {
        let len = metadata.len();
        let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
        Self {
            len,
            modified,
            etag: etag_for(modified, len),
            content_type: content_type_for(path),
        }
    }

    /// True when `metadata` still describes the same file contents.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        metadata.len() == self.len && metadata.modified().unwrap_or(UNIX_EPOCH) == self.modified
    }

    /// `Last-Modified` value in IMF-fixdate.
    pub fn last_modified(&self) -> String {
        httpdate::fmt_http_date(self.modified)
    }
}

/// Strong validator built from mtime and size.
pub fn etag_for(modified: SystemTime, len: u64) -> String {
    let secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("\"{:x}-{:x}\"", secs, len)
}

/// Content type by extension. Winget manifests are YAML.
pub fn content_type_for(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase) {
        Some(ext) if ext == "yaml" || ext == "yml" => "application/x-yaml".to_string(),
        _ => mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn etag_encodes_mtime_and_len() {
        let t = UNIX_EPOCH + Duration::from_secs(0x6500_0000);
        assert_eq!(etag_for(t, 255), "\"65000000-ff\"");
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for(Path::new("a/foo.yaml")), "application/x-yaml");
        assert_eq!(content_type_for(Path::new("a/foo.YML")), "application/x-yaml");
        assert_eq!(content_type_for(Path::new("a/index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("a/noext")), "application/octet-stream");
    }

    #[test]
    fn last_modified_is_http_date() {
        let meta = ArtifactMeta {
            len: 1,
            modified: UNIX_EPOCH + Duration::from_secs(784_111_777),
            etag: String::new(),
            content_type: String::new(),
        };
        assert_eq!(meta.last_modified(), "Sun, 06 Nov 1994 08:49:37 GMT");
    }
}
