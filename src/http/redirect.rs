//! Plain-HTTP listener that only redirects to HTTPS.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    response::{IntoResponse, Response},
    Router,
};

use crate::error::MirrorError;
use crate::http::response::moved_permanently;

/// What the redirect handler needs to build the HTTPS URL.
#[derive(Debug, Clone)]
pub struct RedirectTarget {
    /// Used when the request has no usable `Host` header.
    pub public_host: Option<String>,
    pub https_port: u16,
}

/// Router answering every request with a `301` to the HTTPS equivalent.
pub fn redirect_router(target: RedirectTarget) -> Router {
    Router::new().fallback(redirect_handler).with_state(target)
}

async fn redirect_handler(State(target): State<RedirectTarget>, request: Request<Body>) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .and_then(strip_port)
        .or(target.public_host.as_deref());
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let Some(host) = host else {
        return MirrorError::BadRequest("missing or invalid Host header".into()).into_response();
    };

    let location = https_location(host, target.https_port, path_and_query);
    tracing::debug!(location = %location, "Redirecting to HTTPS");
    moved_permanently(&location).into_response()
}

/// Host part of a `Host` header value, or `None` if it is not a plain
/// hostname, IPv4 or bracketed IPv6 literal.
pub fn strip_port(value: &str) -> Option<&str> {
    let value = value.trim();
    let host = if value.starts_with('[') {
        let end = value.find(']')?;
        let rest = &value[end + 1..];
        if !(rest.is_empty() || rest.strip_prefix(':').is_some_and(is_port)) {
            return None;
        }
        &value[..=end]
    } else {
        match value.rsplit_once(':') {
            Some((host, port)) if is_port(port) && !host.contains(':') => host,
            Some(_) => return None,
            None => value,
        }
    };

    let valid = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '[' | ']' | ':'));
    valid.then_some(host)
}

fn is_port(p: &str) -> bool {
    !p.is_empty() && p.chars().all(|c| c.is_ascii_digit())
}

/// `https://host[:port]/path?query`, omitting the default port.
pub fn https_location(host: &str, port: u16, path_and_query: &str) -> String {
    if port == 443 {
        format!("https://{host}{path_and_query}")
    } else {
        format!("https://{host}:{port}{path_and_query}")
    }
}
