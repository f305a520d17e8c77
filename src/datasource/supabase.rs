//! Supabase Storage datasource.
//!
//! Talks to the bucket REST API under `{url}/storage/v1`:
//!
//! - `POST   object/{bucket}/{key}`   upload (upsert)
//! - `DELETE object/{bucket}/{key}`   delete one
//! - `POST   object/list/{bucket}`    list, body `{prefix, search?}`
//! - `DELETE object/{bucket}`         batch delete, body `{prefixes}`
//! - `GET    object/{bucket}/{key}`   read, with a `Range` header
//!
//! Every call carries the service key as a bearer token. There is no retry:
//! a failed call is returned to the caller as is.

use super::{ByteRange, ByteStream, Datasource, DatasourceError, DatasourceResult, stream};
use crate::{
    config::{Secret, SupabaseConfig},
    mimes,
    models::listing::{BatchDeleteRequest, ListEntry, ListRequest, provider_failure},
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Client, Response, StatusCode,
    header::{CONTENT_TYPE, RANGE},
};
use serde_json::Value;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct SupabaseDatasource {
    http: Client,
    /// `{url}/storage/v1`
    base: String,
    bucket: String,
    key: Secret,
    strict_uploads: bool,
}

impl SupabaseDatasource {
    pub fn new(cfg: &SupabaseConfig) -> DatasourceResult<Self> {
        if cfg.url.is_empty() {
            return Err(DatasourceError::Configuration("url is empty".into()));
        }
        if cfg.bucket.is_empty() {
            return Err(DatasourceError::Configuration("bucket is empty".into()));
        }
        if cfg.key.expose().is_empty() {
            return Err(DatasourceError::Configuration("service key is empty".into()));
        }

        let http = Client::builder().build()?;
        Ok(Self {
            http,
            base: format!("{}/storage/v1", cfg.url.trim_end_matches('/')),
            bucket: cfg.bucket.clone(),
            key: cfg.key.clone(),
            strict_uploads: cfg.strict_uploads,
        })
    }

    /// Keys are opaque, so they are percent-encoded as a single segment.
    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/object/{}/{}",
            self.base,
            self.bucket,
            urlencoding::encode(key)
        )
    }

    fn bucket_url(&self) -> String {
        format!("{}/object/{}", self.base, self.bucket)
    }

    fn list_url(&self) -> String {
        format!("{}/object/list/{}", self.base, self.bucket)
    }

    /// List the bucket root, optionally filtered by a name search.
    async fn list(&self, search: Option<&str>) -> DatasourceResult<Vec<ListEntry>> {
        let response = self
            .http
            .post(self.list_url())
            .bearer_auth(self.key.expose())
            .json(&ListRequest { prefix: "", search })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failure(None, response).await);
        }
        let body: Value = response.json().await?;

        if let Some((error, message)) = provider_failure(&body) {
            return Err(DatasourceError::Provider { error, message });
        }
        Ok(serde_json::from_value(body)?)
    }
}

/// Turn a non-success response into an error, reading the provider's
/// `error`/`message` body when there is one. With `key` set, "not found"
/// answers become [`DatasourceError::NotFound`].
async fn failure(key: Option<&str>, response: Response) -> DatasourceError {
    let status = response.status();
    let body = response.json::<Value>().await.unwrap_or(Value::Null);

    let err = match provider_failure(&body) {
        Some((error, message)) => DatasourceError::Provider { error, message },
        None => DatasourceError::Provider {
            error: status.as_str().to_string(),
            message: status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        },
    };

    match key {
        Some(key) if status == StatusCode::NOT_FOUND || err.is_not_found() => {
            DatasourceError::NotFound {
                key: key.to_string(),
            }
        }
        _ => err,
    }
}

#[async_trait]
impl Datasource for SupabaseDatasource {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn save(&self, key: &str, data: Bytes) -> DatasourceResult<()> {
        let len = data.len();
        let response = self
            .http
            .post(self.object_url(key))
            .bearer_auth(self.key.expose())
            .header(CONTENT_TYPE, mimes::guess(key))
            .header("x-upsert", "true")
            .body(data)
            .send()
            .await?;

        let rejected = if response.status().is_success() {
            let body: Value = response.json().await?;
            provider_failure(&body)
                .map(|(error, message)| DatasourceError::Provider { error, message })
        } else {
            Some(failure(None, response).await)
        };

        if let Some(err) = rejected {
            error!(datasource = "supabase", %key, error = %err, "upload rejected");
            if self.strict_uploads {
                return Err(err);
            }
            return Ok(());
        }

        debug!(%key, bytes = len, "uploaded object");
        Ok(())
    }

    async fn delete(&self, key: &str) -> DatasourceResult<()> {
        let response = self
            .http
            .delete(self.object_url(key))
            .bearer_auth(self.key.expose())
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(());
        }
        match failure(Some(key), response).await {
            DatasourceError::NotFound { .. } => {
                debug!(%key, "delete of missing object");
                Ok(())
            }
            err => Err(err),
        }
    }

    async fn clear(&self) -> DatasourceResult<()> {
        // A listing failure aborts before anything is deleted.
        let entries = self.list(None).await?;
        if entries.is_empty() {
            debug!(bucket = %self.bucket, "nothing to clear");
            return Ok(());
        }

        let prefixes: Vec<String> = entries.into_iter().map(|e| e.name).collect();
        let response = self
            .http
            .delete(self.bucket_url())
            .bearer_auth(self.key.expose())
            .json(&BatchDeleteRequest {
                prefixes: &prefixes,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failure(None, response).await);
        }
        let body: Value = response.json().await?;
        if let Some((error, message)) = provider_failure(&body) {
            return Err(DatasourceError::Provider { error, message });
        }

        info!(bucket = %self.bucket, count = prefixes.len(), "cleared bucket");
        Ok(())
    }

    async fn get(&self, key: &str, range: ByteRange) -> DatasourceResult<ByteStream> {
        // 200 vs 206 is not checked: the body starts at or before `range.start`.
        let response = self
            .http
            .get(self.object_url(key))
            .bearer_auth(self.key.expose())
            .header(RANGE, range.to_header())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(failure(Some(key), response).await);
        }
        Ok(stream::from_response(response))
    }

    async fn size(&self, key: &str) -> DatasourceResult<Option<u64>> {
        // `search` is a substring filter, so only an exact name counts.
        Ok(self
            .list(Some(key))
            .await?
            .into_iter()
            .find(|entry| entry.name == key)
            .map(|entry| entry.size()))
    }

    async fn full_size(&self) -> DatasourceResult<u64> {
        Ok(self.list(None).await?.iter().map(ListEntry::size).sum())
    }
}
