//! End-to-end request handling through the full middleware stack.

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderValue, Method, StatusCode};

use winget_mirror::config::{validate_config, BucketConfig, ValidationError};

mod common;

use common::{body_bytes, request, TestMirror, DOWNLOAD_LEN, DOWNLOAD_PATH, MANIFEST_BODY, MANIFEST_PATH};

#[tokio::test]
async fn manifest_is_served_with_cors_and_cache_control() {
    let mirror = TestMirror::new();

    let response = mirror.get(MANIFEST_PATH).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::CONTENT_TYPE], "application/x-yaml");
    assert!(headers.contains_key(header::ETAG));
    assert!(headers.contains_key(header::LAST_MODIFIED));
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers[header::STRICT_TRANSPORT_SECURITY], "max-age=31536000");
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::SERVER], "winget-mirror");
    assert_eq!(&body_bytes(response).await[..], MANIFEST_BODY);
}

#[tokio::test]
async fn download_is_immutable() {
    let mirror = TestMirror::new();

    let response = mirror.get(DOWNLOAD_PATH).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=31536000, immutable"
    );
    assert_eq!(body_bytes(response).await.len(), DOWNLOAD_LEN);
    assert_eq!(mirror.state.transfers.active_count(), 0);
    assert_eq!(mirror.state.transfers.aborted_count(), 0);
}

#[tokio::test]
async fn client_request_id_is_propagated() {
    let mirror = TestMirror::new();
    let mut req = request(Method::GET, MANIFEST_PATH);
    req.headers_mut()
        .insert("x-request-id", HeaderValue::from_static("abc-123"));

    let response = mirror.send(req).await;
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}

#[tokio::test]
async fn missing_manifest_is_404_and_not_cached() {
    let mirror = TestMirror::new();
    let path = "/manifests/bar/2.0.0/bar.yaml";

    let response = mirror.get(path).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert!(mirror.state.cache.is_empty());

    let dir = mirror.manifest_root().join("bar/2.0.0");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("bar.yaml"), b"PackageIdentifier: Bar\n").unwrap();

    let response = mirror.get(path).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn cache_hit_follows_file_changes() {
    let mirror = TestMirror::new();
    assert_eq!(mirror.get(MANIFEST_PATH).await.status(), StatusCode::OK);
    assert_eq!(mirror.state.cache.len(), 1);

    let file = mirror.manifest_root().join("foo/1.0.0/foo.yaml");
    std::fs::write(&file, b"PackageIdentifier: Foo\nPackageVersion: 1.0.0\nLicense: MIT\n").unwrap();
    let response = mirror.get(MANIFEST_PATH).await;
    assert!(body_bytes(response).await.ends_with(b"License: MIT\n"));

    std::fs::remove_file(&file).unwrap();
    assert_eq!(mirror.get(MANIFEST_PATH).await.status(), StatusCode::NOT_FOUND);
    assert!(mirror.state.cache.is_empty());
}

#[tokio::test]
async fn forbidden_paths() {
    let mirror = TestMirror::new();

    for path in [
        "/downloads/Foo/",
        "/downloads/Foo/Bar/1.0.0/",
        "/downloads/.env",
        "/manifests/.git/config",
        "/manifests/../downloads/Foo/Bar/1.0.0/x.msix",
        "/manifests/%2e%2e/downloads/.env",
    ] {
        let response = mirror.get(path).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{path}");
    }
}

#[tokio::test]
async fn unmatched_paths_are_404() {
    let mirror = TestMirror::new();
    assert_eq!(mirror.get("/").await.status(), StatusCode::NOT_FOUND);
    assert_eq!(mirror.get("/manifestsx/foo").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn manifest_directory_listing() {
    let mirror = TestMirror::new();

    let response = mirror.get("/manifests/foo").await;
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()[header::LOCATION], "/manifests/foo/");

    let response = mirror.get("/manifests/foo/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    let html = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    assert!(html.contains("href=\"1.0.0/\""));
    assert!(!html.contains(".git"));
}

#[tokio::test]
async fn manifest_listing_can_be_disabled() {
    let mirror = TestMirror::with_config(|c| c.manifest.directory_listing = false);
    assert_eq!(mirror.get("/manifests/foo/").await.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn conditional_get_returns_304() {
    let mirror = TestMirror::new();
    let first = mirror.get(MANIFEST_PATH).await;
    let etag = first.headers()[header::ETAG].clone();

    let mut req = request(Method::GET, MANIFEST_PATH);
    req.headers_mut().insert(header::IF_NONE_MATCH, etag.clone());
    let response = mirror.send(req).await;

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.headers()[header::ETAG], etag);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn single_range_returns_206() {
    let mirror = TestMirror::new();
    let mut req = request(Method::GET, DOWNLOAD_PATH);
    req.headers_mut()
        .insert(header::RANGE, HeaderValue::from_static("bytes=0-9"));

    let response = mirror.send(req).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-9/1000");
    assert_eq!(&body_bytes(response).await[..], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
}

#[tokio::test]
async fn range_past_end_returns_416() {
    let mirror = TestMirror::new();
    let mut req = request(Method::GET, DOWNLOAD_PATH);
    req.headers_mut()
        .insert(header::RANGE, HeaderValue::from_static("bytes=5000-"));

    let response = mirror.send(req).await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
}

#[tokio::test]
async fn head_has_length_and_no_body() {
    let mirror = TestMirror::new();
    let response = mirror.send(request(Method::HEAD, DOWNLOAD_PATH)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn preflight_and_disallowed_methods() {
    let mirror = TestMirror::new();

    let mut req = request(Method::OPTIONS, DOWNLOAD_PATH);
    req.headers_mut()
        .insert(header::ORIGIN, HeaderValue::from_static("https://example.com"));
    let response = mirror.send(req).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(response.headers()[header::ALLOW], "GET, HEAD, OPTIONS");

    let response = mirror.send(request(Method::POST, MANIFEST_PATH)).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET, HEAD, OPTIONS");

    let response = mirror.send(request(Method::DELETE, "/health")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn rate_limited_download_gets_429_while_health_stays_up() {
    let mirror = TestMirror::with_config(|c| {
        c.download.rate_limit = BucketConfig {
            requests_per_second: 0.01,
            burst_size: 1,
        };
    });

    assert_eq!(mirror.get(DOWNLOAD_PATH).await.status(), StatusCode::OK);

    let response = mirror.get(DOWNLOAD_PATH).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let response = mirror.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "ok");

    // Manifests have their own bucket.
    assert_eq!(mirror.get(MANIFEST_PATH).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn rejected_methods_are_not_charged() {
    let mirror = TestMirror::with_config(|c| {
        c.download.rate_limit = BucketConfig {
            requests_per_second: 0.01,
            burst_size: 1,
        };
    });

    for method in [Method::POST, Method::DELETE, Method::PUT] {
        let response = mirror.send(request(method, DOWNLOAD_PATH)).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
    assert_eq!(mirror.get(DOWNLOAD_PATH).await.status(), StatusCode::OK);
    assert_eq!(mirror.get(DOWNLOAD_PATH).await.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[test]
fn extreme_ttl_and_refill_rate_fail_validation() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::fixture_config(dir.path(), |_| {});
    assert_eq!(validate_config(&config), Ok(()));

    config.download.cache_ttl_secs = u64::MAX;
    config.download.rate_limit.requests_per_second = 1e-30;
    let errors = validate_config(&config).unwrap_err();
    assert!(errors.iter().any(|e| matches!(e, ValidationError::TtlTooLong { .. })));
    assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidBucket { .. })));
}

#[tokio::test]
async fn extreme_ttl_and_refill_rate_still_answer() {
    let mirror = TestMirror::with_config(|c| {
        c.download.cache_ttl_secs = u64::MAX;
        c.download.rate_limit = BucketConfig {
            requests_per_second: 1e-30,
            burst_size: 1,
        };
    });

    assert_eq!(mirror.get(DOWNLOAD_PATH).await.status(), StatusCode::OK);
    assert_eq!(mirror.state.cache.len(), 1);

    let response = mirror.get(DOWNLOAD_PATH).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], u64::MAX.to_string().as_str());
}

#[tokio::test]
async fn buckets_are_per_client() {
    let mirror = TestMirror::with_config(|c| {
        c.download.rate_limit = BucketConfig {
            requests_per_second: 0.01,
            burst_size: 1,
        };
    });

    assert_eq!(mirror.get(DOWNLOAD_PATH).await.status(), StatusCode::OK);
    assert_eq!(mirror.get(DOWNLOAD_PATH).await.status(), StatusCode::TOO_MANY_REQUESTS);

    let mut req = request(Method::GET, DOWNLOAD_PATH);
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 2], 5555))));
    assert_eq!(mirror.send(req).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_degrades_when_a_root_disappears() {
    let mirror = TestMirror::new();
    std::fs::remove_dir_all(mirror.dir.path().join("downloads")).unwrap();

    let response = mirror.get("/health").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["roots"]["download"], false);
}
