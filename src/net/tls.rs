//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load the PEM certificate chain and private key
//! - Refuse keys readable by group or others (Unix)
//! - Build a rustls server config pinned to TLS 1.3 and TLS 1.2
//! - Swap certificates in place on reload
//! - Count failed handshakes
//!
//! # Design Decisions
//! - Certificates are only read, never generated
//! - A failed reload keeps serving the current certificate

use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::accept::Accept;
use axum_server::tls_rustls::RustlsConfig;
use futures_util::future::BoxFuture;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::config::TlsConfig;
use crate::observability::metrics;

/// ALPN identifiers offered to clients, in preference order.
const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("private key {path:?} is accessible by group or others (mode {mode:o})")]
    KeyPermissions { path: PathBuf, mode: u32 },

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Read every certificate of a PEM chain.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Read the first private key (PKCS#8, PKCS#1 or SEC1) of a PEM file.
pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

/// Fail when the key file grants any permission to group or others.
#[cfg(unix)]
pub fn check_key_permissions(path: &Path) -> Result<(), TlsError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .permissions()
        .mode();
    if mode & 0o077 != 0 {
        return Err(TlsError::KeyPermissions {
            path: path.to_path_buf(),
            mode: mode & 0o777,
        });
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn check_key_permissions(_path: &Path) -> Result<(), TlsError> {
    Ok(())
}

/// Build the rustls server configuration from the configured files.
pub fn build_server_config(config: &TlsConfig) -> Result<rustls::ServerConfig, TlsError> {
    if config.check_key_permissions {
        check_key_permissions(&config.key_path)?;
    }
    let certs = load_certs(&config.cert_path)?;
    let key = load_key(&config.key_path)?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut server_config = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    server_config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    Ok(server_config)
}

/// Load the certificate for the HTTPS listener.
pub fn load_rustls_config(config: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let server_config = build_server_config(config)?;
    tracing::info!(
        cert = ?config.cert_path,
        key = ?config.key_path,
        "TLS certificate loaded"
    );
    Ok(RustlsConfig::from_config(Arc::new(server_config)))
}

/// Reload the certificate in place. On failure the current one stays active.
pub fn reload(rustls: &RustlsConfig, config: &TlsConfig) -> Result<(), TlsError> {
    match build_server_config(config) {
        Ok(server_config) => {
            rustls.reload_from_config(Arc::new(server_config));
            tracing::info!(cert = ?config.cert_path, "TLS certificate reloaded");
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                "TLS reload failed, keeping current certificate"
            );
            Err(e)
        }
    }
}

/// Acceptor wrapper that logs and counts failed handshakes.
///
/// Handshake failures close the connection; no HTTP response is possible.
#[derive(Debug, Clone)]
pub struct HandshakeLoggingAcceptor<A> {
    inner: A,
}

impl<A> HandshakeLoggingAcceptor<A> {
    pub fn new(inner: A) -> Self {
        Self { inner }
    }
}

impl<A, I, S> Accept<I, S> for HandshakeLoggingAcceptor<A>
where
    A: Accept<I, S>,
    A::Future: Send + 'static,
{
    type Stream = A::Stream;
    type Service = A::Service;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let handshake = self.inner.accept(stream, service);
        Box::pin(async move {
            let result = handshake.await;
            if let Err(e) = &result {
                tracing::debug!(error = %e, "TLS handshake failed");
                metrics::record_tls_handshake_failure();
            }
            result
        })
    }
}
