//! Response construction for artifacts.
//!
//! # Responsibilities
//! - Validators and cache headers on file responses
//! - 304 / 206 / 416 decisions (see conditional.rs)
//! - Stream file bodies in fixed-size chunks
//! - Directory listing pages
//!
//! # Design Decisions
//! - Bodies are never buffered whole; a dropped body closes the file
//! - `HEAD` gets the same headers as `GET` and no body

use std::io::SeekFrom;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{MirrorError, MirrorResult};
use crate::http::conditional::{self, Precondition, RangeRequest};
use crate::net::{TransferGuard, TransferTracker};
use crate::resolver::ArtifactMeta;
use crate::routing::RouteClass;

/// Body chunk size.
const CHUNK_SIZE: u64 = 64 * 1024;

fn header_value(value: &str) -> MirrorResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| MirrorError::Internal(e.to_string()))
}

fn validator_headers(
    headers: &mut HeaderMap,
    meta: &ArtifactMeta,
    cache_control: &str,
) -> MirrorResult<()> {
    headers.insert(header::ETAG, header_value(&meta.etag)?);
    headers.insert(header::LAST_MODIFIED, header_value(&meta.last_modified())?);
    headers.insert(header::CACHE_CONTROL, header_value(cache_control)?);
    Ok(())
}

/// A file ready to be answered, with everything the body stream needs.
pub struct FileReply<'a> {
    pub file: File,
    pub meta: &'a ArtifactMeta,
    pub class: RouteClass,
    /// Request path, for transfer logs.
    pub path: String,
    pub cache_control: &'a str,
}

impl FileReply<'_> {
    /// Build the response for `method` given the request `headers`.
    pub async fn respond(
        self,
        method: &Method,
        headers: &HeaderMap,
        tracker: &TransferTracker,
    ) -> MirrorResult<Response> {
        let meta = self.meta;

        if conditional::evaluate(headers, meta) == Precondition::NotModified {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            validator_headers(response.headers_mut(), meta, self.cache_control)?;
            return Ok(response);
        }

        let range = if method == Method::GET {
            conditional::select_range(headers, meta)
        } else {
            RangeRequest::Full
        };
        let (status, start, len) = match range {
            RangeRequest::Full => (StatusCode::OK, 0, meta.len),
            RangeRequest::Partial { start, end } => {
                (StatusCode::PARTIAL_CONTENT, start, end - start + 1)
            }
            RangeRequest::Unsatisfiable => {
                return Err(MirrorError::RangeNotSatisfiable { len: meta.len });
            }
        };

        let body = if method == Method::HEAD {
            Body::empty()
        } else {
            let mut file = self.file;
            if start > 0 {
                file.seek(SeekFrom::Start(start)).await?;
            }
            let guard = tracker.track(self.class, self.path, len);
            stream_file(file, len, guard)
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        let out = response.headers_mut();
        validator_headers(out, meta, self.cache_control)?;
        out.insert(header::CONTENT_TYPE, header_value(&meta.content_type)?);
        out.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        out.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        if let Some(content_range) = range.content_range(meta.len) {
            out.insert(header::CONTENT_RANGE, header_value(&content_range)?);
        }
        Ok(response)
    }
}

struct BodyState {
    file: File,
    remaining: u64,
    guard: TransferGuard,
}

async fn next_chunk(mut state: BodyState) -> std::io::Result<Option<(Bytes, BodyState)>> {
    if state.remaining == 0 {
        return Ok(None);
    }
    let mut buf = vec![0u8; state.remaining.min(CHUNK_SIZE) as usize];
    let n = state.file.read(&mut buf).await?;
    if n == 0 {
        tracing::warn!(transfer_id = %state.guard.id(), "File shrank during transfer");
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    buf.truncate(n);
    state.guard.record_sent(n);
    state.remaining -= n as u64;
    Ok(Some((Bytes::from(buf), state)))
}

/// Stream `len` bytes from the current position of `file`.
///
/// The guard travels with the stream state, so a client abort (body
/// dropped) is observed when the state is dropped.
fn stream_file(file: File, len: u64, guard: TransferGuard) -> Body {
    let state = BodyState {
        file,
        remaining: len,
        guard,
    };
    Body::from_stream(futures_util::stream::try_unfold(state, next_chunk))
}

/// HTML directory listing.
pub fn listing_response(method: &Method, html: String, cache_control: &str) -> MirrorResult<Response> {
    let len = html.len() as u64;
    let body = if method == Method::HEAD {
        Body::empty()
    } else {
        Body::from(html)
    };
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(header::CACHE_CONTROL, header_value(cache_control)?);
    Ok(response)
}

/// `301` to `location`.
pub fn moved_permanently(location: &str) -> MirrorResult<Response> {
    let mut response = StatusCode::MOVED_PERMANENTLY.into_response();
    response
        .headers_mut()
        .insert(header::LOCATION, header_value(location)?);
    Ok(response)
}
