//! Static file resolver.
//!
//! # Data Flow
//! ```text
//! (RouteClass, raw request path)
//!     → path.rs (percent-decode, collapse ./.., reject dotfiles)
//!     → join with the class root
//!     → canonicalize and check containment (symlink escape)
//!     → stat: File | Directory (listing policy) | NotFound
//! ```
//!
//! # Design Decisions
//! - Roots are canonicalized once at startup
//! - The artifact tree is read-only; nothing here writes to it
//! - Download directories are never listable

pub mod artifact;
pub mod listing;
pub mod path;

use std::io;
use std::path::{Path, PathBuf};

use crate::config::MirrorConfig;
use crate::routing::RouteClass;

pub use artifact::{ArtifactKind, ArtifactMeta, ArtifactReference};
pub use path::{normalize, NormalizedPath};

/// Why a path could not be resolved to a servable artifact.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("artifact not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
struct Root {
    configured: PathBuf,
    canonical: PathBuf,
}

impl Root {
    fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            configured: path.to_path_buf(),
            canonical: std::fs::canonicalize(path)?,
        })
    }
}

/// Maps request paths to artifacts under the per-class roots.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    manifest: Option<Root>,
    download: Option<Root>,
    manifest_listing: bool,
}

impl StaticResolver {
    /// Build a resolver for the classes named in the route table.
    ///
    /// Fails when a configured root cannot be canonicalized.
    pub fn from_config(config: &MirrorConfig) -> io::Result<Self> {
        let has = |class| config.routes.iter().any(|r| r.class == class);

        let manifest = if has(RouteClass::Manifest) {
            Some(Root::open(&config.manifest.root)?)
        } else {
            None
        };
        let download = if has(RouteClass::Download) {
            Some(Root::open(&config.download.root)?)
        } else {
            None
        };

        Ok(Self {
            manifest,
            download,
            manifest_listing: config.manifest.directory_listing,
        })
    }

    fn root(&self, class: RouteClass) -> Option<&Root> {
        match class {
            RouteClass::Manifest => self.manifest.as_ref(),
            RouteClass::Download => self.download.as_ref(),
            RouteClass::Health => None,
        }
    }

    /// Canonical root of a class.
    pub fn root_path(&self, class: RouteClass) -> Option<&Path> {
        self.root(class).map(|r| r.canonical.as_path())
    }

    /// Configured roots, for readiness checks and diagnostics.
    pub fn roots(&self) -> Vec<(RouteClass, &Path)> {
        [RouteClass::Manifest, RouteClass::Download]
            .into_iter()
            .filter_map(|class| self.root(class).map(|r| (class, r.configured.as_path())))
            .collect()
    }

    /// Whether directories of this class may be listed.
    pub fn allows_listing(&self, class: RouteClass) -> bool {
        class == RouteClass::Manifest && self.manifest_listing
    }

    /// Resolve a raw request path (relative to the route prefix).
    pub async fn resolve(
        &self,
        class: RouteClass,
        request_path: &str,
    ) -> Result<ArtifactReference, ResolveError> {
        let normalized = path::normalize(request_path)?;
        self.resolve_normalized(class, &normalized).await
    }

    /// Resolve an already normalized path.
    pub async fn resolve_normalized(
        &self,
        class: RouteClass,
        normalized: &NormalizedPath,
    ) -> Result<ArtifactReference, ResolveError> {
        let root = self.root(class).ok_or(ResolveError::NotFound)?;
        let candidate = root.canonical.join(normalized.to_relative());

        let canonical = match tokio::fs::canonicalize(&candidate).await {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(ResolveError::Forbidden("permission denied"));
            }
            // Missing files and non-directory intermediate segments alike.
            Err(_) => return Err(ResolveError::NotFound),
        };

        let Ok(inside) = canonical.strip_prefix(&root.canonical) else {
            tracing::warn!(
                class = %class,
                path = ?candidate,
                target = ?canonical,
                "Symlink escapes route root"
            );
            return Err(ResolveError::Forbidden("path escapes the route root"));
        };
        if inside
            .components()
            .any(|c| c.as_os_str().to_str().map_or(true, path::is_hidden))
        {
            return Err(ResolveError::Forbidden("dotfile access denied"));
        }

        let metadata = match tokio::fs::metadata(&canonical).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(ResolveError::NotFound),
            Err(e) => return Err(ResolveError::Io(e)),
        };

        let kind = if metadata.is_dir() {
            if !self.allows_listing(class) {
                return Err(ResolveError::Forbidden("directory listing denied"));
            }
            ArtifactKind::Directory
        } else if metadata.is_file() {
            ArtifactKind::File
        } else {
            return Err(ResolveError::NotFound);
        };

        Ok(ArtifactReference {
            class,
            path: canonical,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        resolver: StaticResolver,
    }

    fn fixture(listing: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let manifests = dir.path().join("manifests");
        let downloads = dir.path().join("downloads");
        fs::create_dir_all(manifests.join("foo/1.0.0")).unwrap();
        fs::write(manifests.join("foo/1.0.0/foo.yaml"), b"PackageIdentifier: Foo\n").unwrap();
        fs::write(manifests.join(".htpasswd"), b"admin:x").unwrap();
        fs::create_dir_all(downloads.join("Foo/Bar/1.0.0")).unwrap();
        fs::write(downloads.join("Foo/Bar/1.0.0/x.msix"), b"MSIX").unwrap();
        fs::write(downloads.join(".env"), b"SECRET=1").unwrap();
        fs::write(dir.path().join("outside.txt"), b"outside").unwrap();

        let mut config = MirrorConfig::default();
        config.manifest.root = manifests;
        config.manifest.directory_listing = listing;
        config.download.root = downloads;

        let resolver = StaticResolver::from_config(&config).unwrap();
        Fixture { _dir: dir, resolver }
    }

    #[tokio::test]
    async fn resolves_files_inside_root() {
        let f = fixture(true);
        let artifact = f
            .resolver
            .resolve(RouteClass::Manifest, "/foo/1.0.0/foo.yaml")
            .await
            .unwrap();
        assert_eq!(artifact.kind, ArtifactKind::File);
        assert!(artifact.path.starts_with(f.resolver.root_path(RouteClass::Manifest).unwrap()));
    }

    #[tokio::test]
    async fn traversal_is_forbidden_for_every_class() {
        let f = fixture(true);
        for class in [RouteClass::Manifest, RouteClass::Download] {
            for p in ["/../outside.txt", "/foo/../../outside.txt", "/%2e%2e/outside.txt"] {
                assert!(
                    matches!(f.resolver.resolve(class, p).await, Err(ResolveError::Forbidden(_))),
                    "{class} {p}"
                );
            }
        }
    }

    #[tokio::test]
    async fn dotfiles_are_forbidden_for_every_class() {
        let f = fixture(true);
        assert!(matches!(
            f.resolver.resolve(RouteClass::Manifest, "/.htpasswd").await,
            Err(ResolveError::Forbidden(_))
        ));
        assert!(matches!(
            f.resolver.resolve(RouteClass::Download, "/.env").await,
            Err(ResolveError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn download_directories_are_never_listed() {
        let f = fixture(true);
        for p in ["", "/", "/Foo", "/Foo/Bar/1.0.0/"] {
            assert!(matches!(
                f.resolver.resolve(RouteClass::Download, p).await,
                Err(ResolveError::Forbidden("directory listing denied"))
            ));
        }
    }

    #[tokio::test]
    async fn manifest_directories_follow_listing_flag() {
        let f = fixture(true);
        let artifact = f.resolver.resolve(RouteClass::Manifest, "/foo/").await.unwrap();
        assert_eq!(artifact.kind, ArtifactKind::Directory);

        let f = fixture(false);
        assert!(matches!(
            f.resolver.resolve(RouteClass::Manifest, "/foo/").await,
            Err(ResolveError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn missing_artifacts_are_not_found() {
        let f = fixture(true);
        assert!(matches!(
            f.resolver.resolve(RouteClass::Manifest, "/foo/2.0.0/foo.yaml").await,
            Err(ResolveError::NotFound)
        ));
        assert!(matches!(
            f.resolver.resolve(RouteClass::Download, "/Foo/Bar/1.0.0/x.msix/extra").await,
            Err(ResolveError::NotFound)
        ));
        assert!(matches!(
            f.resolver.resolve(RouteClass::Health, "/").await,
            Err(ResolveError::NotFound)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_escape_is_forbidden() {
        let f = fixture(true);
        let root = f.resolver.root_path(RouteClass::Download).unwrap().to_path_buf();
        let outside = root.parent().unwrap().join("outside.txt");
        std::os::unix::fs::symlink(&outside, root.join("escape.msix")).unwrap();

        assert!(matches!(
            f.resolver.resolve(RouteClass::Download, "/escape.msix").await,
            Err(ResolveError::Forbidden("path escapes the route root"))
        ));
    }

    #[test]
    fn missing_root_fails_construction() {
        let mut config = MirrorConfig::default();
        config.manifest.root = PathBuf::from("/definitely/not/a/root");
        assert!(StaticResolver::from_config(&config).is_err());
    }
}
