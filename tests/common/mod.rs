//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use winget_mirror::config::MirrorConfig;
use winget_mirror::http::{build_router, MirrorState, SharedState};

pub const MANIFEST_PATH: &str = "/manifests/foo/1.0.0/foo.yaml";
pub const MANIFEST_BODY: &[u8] = b"PackageIdentifier: Foo\nPackageVersion: 1.0.0\n";
pub const DOWNLOAD_PATH: &str = "/downloads/Foo/Bar/1.0.0/x.msix";
pub const DOWNLOAD_LEN: usize = 1000;

/// A mirror over a temporary artifact tree, driven without sockets.
pub struct TestMirror {
    pub dir: TempDir,
    pub state: SharedState,
    pub router: Router,
}

impl TestMirror {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut MirrorConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture_config(dir.path(), customize);
        let state = Arc::new(MirrorState::from_config(config).unwrap());
        let router = build_router(state.clone())
            .unwrap()
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        Self { dir, state, router }
    }

    pub fn manifest_root(&self) -> PathBuf {
        self.dir.path().join("manifests")
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(request(Method::GET, uri)).await
    }
}

pub fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

/// Build the artifact tree under `base` and a config pointing at it.
pub fn fixture_config(base: &Path, customize: impl FnOnce(&mut MirrorConfig)) -> MirrorConfig {
    let manifests = base.join("manifests");
    let downloads = base.join("downloads");

    std::fs::create_dir_all(manifests.join("foo/1.0.0")).unwrap();
    std::fs::write(manifests.join("foo/1.0.0/foo.yaml"), MANIFEST_BODY).unwrap();
    std::fs::create_dir_all(manifests.join(".git")).unwrap();
    std::fs::write(manifests.join(".git/config"), b"[core]\n").unwrap();

    std::fs::create_dir_all(downloads.join("Foo/Bar/1.0.0")).unwrap();
    let payload: Vec<u8> = (0..DOWNLOAD_LEN).map(|i| (i % 251) as u8).collect();
    std::fs::write(downloads.join("Foo/Bar/1.0.0/x.msix"), payload).unwrap();
    std::fs::write(downloads.join(".env"), b"SECRET=1\n").unwrap();

    let mut config = MirrorConfig::default();
    config.manifest.root = manifests;
    config.download.root = downloads;
    config.listener.https_address = "127.0.0.1:0".to_string();
    config.listener.http_address = None;
    customize(&mut config);
    config
}
