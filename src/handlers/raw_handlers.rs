//! Raw file delivery: `GET /r/{id}`.
//!
//! The request walks resolve → metadata → password → delivery → accounting
//! and stops at the first failure. Every failure before delivery answers a
//! bare 404 so a caller cannot tell a missing object from a missing record
//! or a wrong password.

use crate::{
    datasource::{ByteRange, ByteStream},
    mimes::DEFAULT_MIME,
    models::file::FileRecord,
    password,
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, warn};

/// Cacheable for about a month, may be served a day stale while revalidating.
pub const RAW_CACHE_CONTROL: &str = "public, max-age=2628000, stale-while-revalidate=86400";

#[derive(Debug, Deserialize)]
pub struct RawQuery {
    pub password: Option<String>,
}

/// `GET /r/{id}?password=...`
pub async fn get_raw(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RawQuery>,
) -> Response {
    let Some((file, stream)) = authorize(&state, &id, query.password).await else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(RAW_CACHE_CONTROL),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&file.mimetype)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MIME)),
    );

    // Counted once the response is ready but before any byte is streamed, so
    // an aborted download still counts. Best effort: a lost view must not
    // cost the client its download.
    if let Err(err) = state.files.increment_views(file.id).await {
        warn!(%id, error = %err, "failed to record view");
    }

    response
}

/// Steps 1-3. `None` means "answer 404"; the opened stream is dropped (and
/// its connection released) on every early return.
async fn authorize(
    state: &AppState,
    id: &str,
    supplied: Option<String>,
) -> Option<(FileRecord, ByteStream)> {
    let stream = match state.datasource.get(id, ByteRange::full()).await {
        Ok(stream) => stream,
        Err(err) => {
            debug!(%id, error = %err, "raw: object unavailable");
            return None;
        }
    };

    let file = match state.files.find_by_name(id).await {
        Ok(Some(file)) => file,
        Ok(None) => {
            debug!(%id, "raw: no metadata record");
            return None;
        }
        Err(err) => {
            warn!(%id, error = %err, "raw: metadata lookup failed");
            return None;
        }
    };

    if let Some(hash) = file.password.clone() {
        let supplied = supplied?;
        match password::verify_password_blocking(supplied, hash).await {
            Ok(true) => {}
            Ok(false) => return None,
            Err(err) => {
                warn!(%id, error = %err, "raw: password check failed");
                return None;
            }
        }
    }

    Some((file, stream))
}
