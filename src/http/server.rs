//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with the mirror handler
//! - Wire up middleware (request ID, tracing, security headers,
//!   classification, rate limiting)
//! - Resolve artifacts through the cache, falling back to the filesystem
//! - Serve HTTPS, the plain-HTTP redirect and the admin API until shutdown
//!
//! # Middleware order (outermost first)
//! ```text
//! SetRequestId → Trace → PropagateRequestId → security headers
//!     → classify (CORS, metrics) → rate limit → mirror_handler
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, request::Parts, Method},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use tokio::fs::File;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::cache::{cache_key, ArtifactCache, CachePolicy};
use crate::config::MirrorConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::health::health_response;
use crate::http::redirect::{redirect_router, RedirectTarget};
use crate::http::request::{request_id, MakeRequestUuid, X_REQUEST_ID};
use crate::http::response::{listing_response, moved_permanently, FileReply};
use crate::lifecycle::Shutdown;
use crate::net::{HandshakeLoggingAcceptor, TransferTracker};
use crate::observability::metrics;
use crate::resolver::listing::render_listing;
use crate::resolver::{
    normalize, ArtifactKind, ArtifactMeta, ArtifactReference, NormalizedPath, StaticResolver,
};
use crate::routing::{ClassifiedRequest, RouteClass, RouteTable};
use crate::security::headers::security_headers;
use crate::security::{rate_limit_middleware, CorsPolicy, RateLimiter};

/// Application state injected into handlers.
pub struct MirrorState {
    pub config: MirrorConfig,
    pub routes: RouteTable,
    pub resolver: StaticResolver,
    pub cache: ArtifactCache,
    pub limiter: Arc<RateLimiter>,
    pub cors: CorsPolicy,
    pub transfers: TransferTracker,
    pub started_at: tokio::time::Instant,
}

pub type SharedState = Arc<MirrorState>;

impl MirrorState {
    /// Build all request-path subsystems from a validated config.
    ///
    /// Fails when an artifact root cannot be canonicalized.
    pub fn from_config(config: MirrorConfig) -> std::io::Result<Self> {
        let resolver = StaticResolver::from_config(&config)?;
        let cache = ArtifactCache::new(
            CachePolicy::from_config(&config),
            config.cache.enabled,
            config.cache.max_entries,
        );

        Ok(Self {
            routes: RouteTable::from_config(&config.routes),
            resolver,
            cache,
            limiter: Arc::new(RateLimiter::from_config(&config)),
            cors: CorsPolicy::from_config(&config.cors),
            transfers: TransferTracker::new(),
            started_at: tokio::time::Instant::now(),
            config,
        })
    }
}

/// Build the HTTPS application router.
pub fn build_router(state: SharedState) -> Result<Router, header::InvalidHeaderValue> {
    let mut router = Router::new()
        .route("/", any(mirror_handler))
        .route("/{*path}", any(mirror_handler))
        .layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), classify_middleware))
        .with_state(state.clone());

    for (name, value) in security_headers(&state.config.security)? {
        router = router.layer(SetResponseHeaderLayer::overriding(name, value));
    }

    Ok(router
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID.clone()))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id(request),
            )
        }))
        .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuid)))
}

/// Attach the routing decision, answer CORS preflights and record metrics.
async fn classify_middleware(
    State(state): State<SharedState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let start = tokio::time::Instant::now();
    let classified = state
        .routes
        .match_path(request.uri().path())
        .map(ClassifiedRequest::from);
    let class = classified.as_ref().map(|c| c.class);
    let label = class.map_or("unmatched", |c| c.as_str());
    let origin = request.headers().get(header::ORIGIN).cloned();
    let cors = class.is_some_and(|c| c.serves_artifacts());

    let response = if cors && request.method() == Method::OPTIONS {
        state.cors.preflight(origin.as_ref())
    } else {
        if let Some(classified) = classified {
            request.extensions_mut().insert(classified);
        }
        let mut response = next.run(request).await;
        if cors {
            state.cors.apply(origin.as_ref(), response.headers_mut());
        }
        response
    };

    metrics::record_request(label, response.status().as_u16(), start);
    response
}

/// Main mirror handler.
async fn mirror_handler(State(state): State<SharedState>, request: Request<Body>) -> Response {
    let (parts, _body) = request.into_parts();
    let Some(classified) = parts.extensions.get::<ClassifiedRequest>() else {
        return MirrorError::NotFound.into_response();
    };
    if parts.method != Method::GET && parts.method != Method::HEAD {
        return MirrorError::MethodNotAllowed.into_response();
    }

    match classified.class {
        RouteClass::Health => health_response(&state.resolver).await,
        class => serve_artifact(&state, class, classified, &parts)
            .await
            .unwrap_or_else(IntoResponse::into_response),
    }
}

async fn serve_artifact(
    state: &MirrorState,
    class: RouteClass,
    classified: &ClassifiedRequest,
    request: &Parts,
) -> MirrorResult<Response> {
    let normalized = normalize(&classified.remainder)?;
    let key = cache_key(&classified.prefix, &normalized);

    if let Some(entry) = state.cache.lookup(class, &key) {
        match open_file(&entry.artifact.path).await {
            Ok((file, metadata)) if entry.meta.matches(&metadata) => {
                return reply_file(state, class, key, file, &entry.meta, request).await;
            }
            Ok((file, metadata)) => {
                tracing::debug!(path = %key, "Cached artifact changed on disk");
                let meta = ArtifactMeta::from_metadata(&entry.artifact.path, &metadata);
                state.cache.store(key.clone(), entry.artifact.clone(), meta.clone());
                return reply_file(state, class, key, file, &meta, request).await;
            }
            Err(MirrorError::NotFound) => {
                tracing::debug!(path = %key, "Cached artifact vanished, re-resolving");
                state.cache.purge(&key);
            }
            Err(e) => return Err(e),
        }
    }

    let artifact = state.resolver.resolve_normalized(class, &normalized).await?;
    match artifact.kind {
        ArtifactKind::File => {
            let (file, metadata) = open_file(&artifact.path).await?;
            let meta = ArtifactMeta::from_metadata(&artifact.path, &metadata);
            state.cache.store(key.clone(), artifact, meta.clone());
            reply_file(state, class, key, file, &meta, request).await
        }
        ArtifactKind::Directory => {
            serve_directory(state, class, &artifact, &normalized, key, request).await
        }
    }
}

async fn reply_file(
    state: &MirrorState,
    class: RouteClass,
    key: String,
    file: File,
    meta: &ArtifactMeta,
    request: &Parts,
) -> MirrorResult<Response> {
    let cache_control = state.cache.policy().cache_control(class);
    FileReply {
        file,
        meta,
        class,
        path: key,
        cache_control: &cache_control,
    }
    .respond(&request.method, &request.headers, &state.transfers)
    .await
}

async fn serve_directory(
    state: &MirrorState,
    class: RouteClass,
    artifact: &ArtifactReference,
    normalized: &NormalizedPath,
    key: String,
    request: &Parts,
) -> MirrorResult<Response> {
    let uri = &request.uri;
    if !uri.path().ends_with('/') {
        let location = match uri.query() {
            Some(query) => format!("{}/?{}", uri.path(), query),
            None => format!("{}/", uri.path()),
        };
        return moved_permanently(&location);
    }

    let base = if normalized.is_root() { key } else { format!("{key}/") };
    let root = state.resolver.root_path(class).ok_or(MirrorError::NotFound)?;
    let html = render_listing(&artifact.path, root, &base, normalized.is_root()).await?;
    listing_response(
        &request.method,
        html,
        &state.cache.policy().cache_control(class),
    )
}

async fn open_file(path: &std::path::Path) -> MirrorResult<(File, std::fs::Metadata)> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            return Err(match e.kind() {
                std::io::ErrorKind::NotFound => MirrorError::NotFound,
                std::io::ErrorKind::PermissionDenied => MirrorError::Forbidden("permission denied"),
                _ => MirrorError::from(e),
            })
        }
    };
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(MirrorError::NotFound);
    }
    Ok((file, metadata))
}

/// Listeners bound before the server starts.
pub struct Listeners {
    pub https: std::net::TcpListener,
    pub http: Option<TcpListener>,
    pub admin: Option<TcpListener>,
}

/// The mirror server: HTTPS application, redirect and admin listeners.
pub struct MirrorServer {
    state: SharedState,
    app: Router,
}

impl MirrorServer {
    pub fn new(state: SharedState) -> Result<Self, header::InvalidHeaderValue> {
        let app = build_router(state.clone())?;
        Ok(Self { state, app })
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Serve until `shutdown` fires, then drain for the configured grace period.
    pub async fn run(
        self,
        listeners: Listeners,
        tls: RustlsConfig,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let config = &self.state.config;
        let grace = Duration::from_secs(config.lifecycle.shutdown_grace_secs);
        let https_addr = listeners.https.local_addr()?;
        let mut tasks = JoinSet::new();

        let handle = axum_server::Handle::new();
        tokio::spawn({
            let handle = handle.clone();
            let signaled = shutdown.signaled();
            async move {
                signaled.await;
                tracing::info!(
                    grace_secs = grace.as_secs(),
                    connections = handle.connection_count(),
                    "Draining connections"
                );
                handle.graceful_shutdown(Some(grace));
            }
        });

        let app = self.app.into_make_service_with_connect_info::<SocketAddr>();
        let https = axum_server::from_tcp(listeners.https)
            .acceptor(HandshakeLoggingAcceptor::new(RustlsAcceptor::new(tls)))
            .handle(handle);
        tasks.spawn(async move { https.serve(app).await });
        tracing::info!(address = %https_addr, "HTTPS server starting");

        if let Some(listener) = listeners.http {
            let target = RedirectTarget {
                public_host: config.listener.public_host.clone(),
                https_port: config.listener.public_https_port.unwrap_or(https_addr.port()),
            };
            tracing::info!(address = %listener.local_addr()?, "HTTP redirect server starting");
            let serve = axum::serve(listener, redirect_router(target))
                .with_graceful_shutdown(shutdown.signaled());
            tasks.spawn(async move { serve.await });
        }

        if let Some(listener) = listeners.admin {
            tracing::info!(address = %listener.local_addr()?, "Admin API starting");
            let serve = axum::serve(listener, admin::admin_router(self.state.clone()))
                .with_graceful_shutdown(shutdown.signaled());
            tasks.spawn(async move { serve.await });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(std::io::Error::other).and_then(|r| r);
            if let Err(e) = result {
                tracing::error!(error = %e, "Server task failed");
                shutdown.trigger();
                first_error.get_or_insert(e);
            }
        }

        tracing::info!(
            aborted_transfers = self.state.transfers.aborted_count(),
            "Mirror server stopped"
        );
        first_error.map_or(Ok(()), Err)
    }
}
