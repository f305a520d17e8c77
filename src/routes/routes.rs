//! Defines routes for raw delivery and file management.
//!
//! ## Structure
//! - **Public endpoints**
//!   - `GET    /healthz`, `GET /readyz`: probes
//!   - `GET    /r/{id}`: raw file bytes (`?password=` for protected files)
//!
//! - **API endpoints** (Bearer token)
//!   - `POST   /api/upload`: multipart upload
//!   - `DELETE /api/files/{name}`: delete object + record
//!   - `GET    /api/files/{name}/size`: stored size
//!   - `GET    /api/stats`: record count and datasource usage
//!   - `POST   /api/clear`: wipe the datasource and all records

use crate::{
    handlers::{
        file_handlers::{clear, delete_file, file_size, stats, upload_file},
        health_handlers::{healthz, readyz},
        raw_handlers::get_raw,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

/// Build and return the application router.
///
/// `max_upload_bytes` caps the request body of `/api/upload` only.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // raw delivery
        .route("/r/{id}", get(get_raw))
        // management API
        .route(
            "/api/upload",
            post(upload_file).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/files/{name}", delete(delete_file))
        .route("/api/files/{name}/size", get(file_size))
        .route("/api/stats", get(stats))
        .route("/api/clear", post(clear))
}
