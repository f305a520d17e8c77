//! Token-protected file management API.
//!
//! Every write keeps the metadata store behind the datasource: an object is
//! saved before its record is created, and removed before its record is
//! dropped. A datasource failure therefore never leaves a record pointing at
//! nothing.

use crate::{
    errors::AppError,
    handlers::auth::ApiAuth,
    mimes,
    models::file::NewFile,
    password,
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Header carrying an optional password for the uploaded file.
pub const PASSWORD_HEADER: &str = "password";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: Uuid,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct SizeResponse {
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub datasource: &'static str,
    pub files: i64,
    /// `None` when the datasource could not be listed.
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: u64,
}

/// `POST /api/upload`: multipart field `file`, optional `password` header.
pub async fn upload_file(
    _auth: ApiAuth,
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::bad_request(e.to_string()))?;
        upload = Some((original, content_type, data));
        break;
    }

    let Some((original, content_type, data)) = upload else {
        return Err(AppError::bad_request("missing `file` field"));
    };
    if data.is_empty() {
        return Err(AppError::bad_request("file is empty"));
    }

    let id = Uuid::new_v4().simple();
    // The extension becomes part of the object key; anything but ASCII
    // alphanumerics is dropped.
    let extension = mimes::extension(&original)
        .filter(|ext| ext.bytes().all(|b| b.is_ascii_alphanumeric()));
    let name = match extension {
        Some(ext) => format!("{}.{}", id, ext.to_ascii_lowercase()),
        None => id.to_string(),
    };
    let mimetype = content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| mimes::guess(&name).to_string());

    let password = match headers
        .get(PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        Some(plain) => Some(password::hash_password_blocking(plain.to_string()).await?),
        None => None,
    };

    let size = data.len() as i64;
    if let Err(err) = state.datasource.save(&name, data).await {
        error!(%name, error = %err, "upload failed; no record created");
        return Err(err.into());
    }

    let record = match state
        .files
        .insert(NewFile {
            name: name.clone(),
            mimetype,
            password,
            size,
        })
        .await
    {
        Ok(record) => record,
        Err(err) => {
            // Roll the object back so nothing is stored without a record.
            if let Err(cleanup) = state.datasource.delete(&name).await {
                warn!(%name, error = %cleanup, "could not remove orphaned object");
            }
            return Err(err.into());
        }
    };

    info!(%name, size, protected = record.is_protected(), "file uploaded");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id: record.id,
            url: format!("/r/{}", record.name),
            name: record.name,
        }),
    ))
}

/// `DELETE /api/files/{name}`
pub async fn delete_file(
    _auth: ApiAuth,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.files.find_by_name(&name).await?.is_none() {
        return Err(AppError::not_found(format!("file `{}` not found", name)));
    }

    if let Err(err) = state.datasource.delete(&name).await {
        error!(%name, error = %err, "delete failed; keeping record");
        return Err(err.into());
    }
    state.files.delete_by_name(&name).await?;

    info!(%name, "file deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/files/{name}/size`: advisory, a listing failure reads as unknown.
pub async fn file_size(
    _auth: ApiAuth,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<SizeResponse> {
    let size = match state.datasource.size(&name).await {
        Ok(size) => size,
        Err(err) => {
            warn!(%name, error = %err, "size lookup failed");
            None
        }
    };
    Json(SizeResponse { name, size })
}

/// `GET /api/stats`
pub async fn stats(
    _auth: ApiAuth,
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, AppError> {
    let files = state.files.count().await?;
    let size = match state.datasource.full_size().await {
        Ok(size) => Some(size),
        Err(err) => {
            warn!(datasource = state.datasource.name(), error = %err, "full size unavailable");
            None
        }
    };

    Ok(Json(StatsResponse {
        datasource: state.datasource.name(),
        files,
        size,
    }))
}

/// `POST /api/clear`: empties the datasource, then drops every record.
pub async fn clear(
    _auth: ApiAuth,
    State(state): State<AppState>,
) -> Result<Json<ClearResponse>, AppError> {
    if let Err(err) = state.datasource.clear().await {
        error!(datasource = state.datasource.name(), error = %err, "clear failed; records kept");
        return Err(err.into());
    }

    let removed = state.files.delete_all().await?;
    info!(removed, "datasource cleared");
    Ok(Json(ClearResponse { removed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        datasource::memory::MemoryDatasource,
        routes::routes::routes,
        state::testing::{self, TEST_TOKEN},
    };
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-TEST-BOUNDARY";

    async fn app() -> (Router, AppState, Arc<MemoryDatasource>) {
        let (state, memory) = testing::state().await;
        (routes(1024 * 1024).with_state(state.clone()), state, memory)
    }

    fn multipart_body(filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(token: Option<&str>, password: Option<&str>, data: &[u8]) -> Request<Body> {
        upload_named(token, password, "photo.PNG", data)
    }

    fn upload_named(
        token: Option<&str>,
        password: Option<&str>,
        filename: &str,
        data: &[u8],
    ) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(password) = password {
            builder = builder.header(PASSWORD_HEADER, password);
        }
        builder
            .body(Body::from(multipart_body(filename, "image/png", data)))
            .unwrap()
    }

    fn authed(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TEST_TOKEN}"))
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn seed(state: &AppState, memory: &MemoryDatasource, name: &str, data: &'static [u8]) {
        memory.insert(name, data);
        state
            .files
            .insert(NewFile {
                name: name.into(),
                mimetype: mimes::guess(name).into(),
                password: None,
                size: data.len() as i64,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn upload_requires_token() {
        let (app, state, _) = app().await;
        let (status, _) = send(&app, upload_request(None, None, b"data")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, upload_request(Some("wrong"), None, b"data")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(state.files.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upload_saves_object_then_record() {
        let (app, state, memory) = app().await;

        let (status, json) = send(&app, upload_request(Some(TEST_TOKEN), None, b"0123456789")).await;
        assert_eq!(status, StatusCode::CREATED);

        let name = json["name"].as_str().unwrap().to_string();
        assert!(name.ends_with(".png"));
        assert_eq!(json["url"], format!("/r/{name}"));
        assert!(memory.contains(&name));

        let record = state.files.find_by_name(&name).await.unwrap().unwrap();
        assert_eq!(record.mimetype, "image/png");
        assert_eq!(record.size, 10);
        assert!(!record.is_protected());

        let resp = app
            .clone()
            .oneshot(Request::builder().uri(format!("/r/{name}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(body, &b"0123456789"[..]);
    }

    #[tokio::test]
    async fn upload_drops_extension_with_reserved_characters() {
        let (app, state, memory) = app().await;

        for filename in ["photo.png#x", "a.png?y", "b.p/ng"] {
            let req = upload_named(Some(TEST_TOKEN), None, filename, b"abc");
            let (status, json) = send(&app, req).await;
            assert_eq!(status, StatusCode::CREATED, "{filename}");

            let name = json["name"].as_str().unwrap().to_string();
            assert_eq!(name.len(), 32, "{name}");
            assert!(name.bytes().all(|b| b.is_ascii_hexdigit()), "{name}");
            assert!(memory.contains(&name));

            let record = state.files.find_by_name(&name).await.unwrap().unwrap();
            assert_eq!(record.mimetype, "image/png");
        }
    }

    #[tokio::test]
    async fn upload_with_password_stores_hash() {
        let (app, state, _) = app().await;
        let (status, json) =
            send(&app, upload_request(Some(TEST_TOKEN), Some("pw"), b"secret")).await;
        assert_eq!(status, StatusCode::CREATED);

        let record = state
            .files
            .find_by_name(json["name"].as_str().unwrap())
            .await
            .unwrap()
            .unwrap();
        let hash = record.password.unwrap();
        assert!(password::verify_password("pw", &hash).unwrap());
    }

    #[tokio::test]
    async fn failed_save_creates_no_record() {
        let (app, state, memory) = app().await;
        MemoryDatasource::fail(&memory.fail_saves);

        let (status, json) = send(&app, upload_request(Some(TEST_TOKEN), None, b"data")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["status"], 502);
        assert_eq!(state.files.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let (app, _, _) = app().await;
        let (status, _) = send(&app, upload_request(Some(TEST_TOKEN), None, b"")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_removes_object_and_record() {
        let (app, state, memory) = app().await;
        seed(&state, &memory, "a.png", b"0123456789").await;

        let (status, _) = send(&app, authed("DELETE", "/api/files/a.png")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(!memory.contains("a.png"));
        assert!(state.files.find_by_name("a.png").await.unwrap().is_none());

        let (status, _) = send(&app, authed("DELETE", "/api/files/a.png")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_delete_keeps_record() {
        let (app, state, memory) = app().await;
        seed(&state, &memory, "a.png", b"0123456789").await;
        MemoryDatasource::fail(&memory.fail_deletes);

        let (status, _) = send(&app, authed("DELETE", "/api/files/a.png")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(state.files.find_by_name("a.png").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn size_endpoint_reports_absent_as_null() {
        let (app, state, memory) = app().await;
        seed(&state, &memory, "a.png", b"0123456789").await;

        let (status, json) = send(&app, authed("GET", "/api/files/a.png/size")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["size"], 10);

        let (_, json) = send(&app, authed("GET", "/api/files/missing.png/size")).await;
        assert!(json["size"].is_null());
    }

    #[tokio::test]
    async fn stats_degrade_when_listing_fails() {
        let (app, state, memory) = app().await;
        seed(&state, &memory, "a.png", b"0123456789").await;
        seed(&state, &memory, "b.txt", b"abc").await;

        let (status, json) = send(&app, authed("GET", "/api/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["files"], 2);
        assert_eq!(json["size"], 13);
        assert_eq!(json["datasource"], "memory");

        MemoryDatasource::fail(&memory.fail_listing);
        let (status, json) = send(&app, authed("GET", "/api/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["size"].is_null());
    }

    #[tokio::test]
    async fn clear_empties_datasource_and_records() {
        let (app, state, memory) = app().await;
        seed(&state, &memory, "a.png", b"0123456789").await;
        seed(&state, &memory, "b.txt", b"abc").await;

        let (status, json) = send(&app, authed("POST", "/api/clear")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["removed"], 2);
        assert_eq!(state.files.count().await.unwrap(), 0);
        assert_eq!(state.datasource.full_size().await.unwrap(), 0);
        assert_eq!(state.datasource.size("a.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_clear_keeps_records() {
        let (app, state, memory) = app().await;
        seed(&state, &memory, "a.png", b"0123456789").await;
        MemoryDatasource::fail(&memory.fail_listing);

        let (status, _) = send(&app, authed("POST", "/api/clear")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(state.files.count().await.unwrap(), 1);
        assert!(memory.contains("a.png"));
    }
}
