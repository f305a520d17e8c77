//! Storage backends for uploaded objects.
//!
//! Every backend implements [`Datasource`], a flat key → bytes contract:
//! objects are addressed by an opaque key (the generated file name) and read
//! back as a lazy [`ByteStream`], optionally restricted to a [`ByteRange`].
//! One backend is chosen at startup by [`from_config`] and handed to the rest
//! of the application as a [`SharedDatasource`].

use crate::config::DatasourceConfig;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{fmt::Debug, io, sync::Arc};
use thiserror::Error;

pub mod local;
pub mod stream;
pub mod supabase;

#[cfg(test)]
pub mod memory;

pub use local::LocalDatasource;
pub use supabase::SupabaseDatasource;

/// Single-pass body of a stored object. Dropping it early is a valid close.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

pub type SharedDatasource = Arc<dyn Datasource>;

#[derive(Debug, Error)]
pub enum DatasourceError {
    /// The provider answered, but its JSON body carried an `error` field.
    #[error("{error}: {message}")]
    Provider { error: String, message: String },
    #[error("object `{key}` not found")]
    NotFound { key: String },
    #[error("invalid object key")]
    InvalidKey,
    #[error("datasource misconfigured: {0}")]
    Configuration(String),
    #[error("unexpected provider response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DatasourceError {
    /// Whether the error means the key does not exist, however the backend
    /// chose to phrase it.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Provider { error, message } => {
                let error = error.to_ascii_lowercase();
                error.contains("not_found")
                    || error.contains("not found")
                    || error == "404"
                    || message.eq_ignore_ascii_case("object not found")
            }
            Self::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type DatasourceResult<T> = Result<T, DatasourceError>;

/// Inclusive byte window `[start, end]`; `end: None` reads through the end of
/// the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub const fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// The whole object.
    pub const fn full() -> Self {
        Self {
            start: 0,
            end: None,
        }
    }

    /// Value for an HTTP `Range` request header. Not validated: an
    /// unsatisfiable window is passed through for the backend to judge.
    pub fn to_header(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }

    /// Number of bytes covered, `None` when unbounded.
    pub fn length(&self) -> Option<u64> {
        self.end
            .map(|end| end.checked_sub(self.start).map_or(0, |span| span + 1))
    }
}

/// Object persistence contract shared by every backend.
///
/// Operations that only *report* (`size`, `full_size`) still return a
/// `Result`; callers decide whether a failure degrades to "unknown" or is
/// surfaced. Absence is never an error for `size` or `delete`.
#[async_trait]
pub trait Datasource: Debug + Send + Sync {
    /// Short backend identifier used in logs and stats.
    fn name(&self) -> &'static str;

    /// Store `data` under `key`, replacing any existing object.
    async fn save(&self, key: &str, data: Bytes) -> DatasourceResult<()>;

    /// Remove `key`. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> DatasourceResult<()>;

    /// Remove every object in the namespace. If the namespace cannot be
    /// enumerated nothing is deleted.
    async fn clear(&self) -> DatasourceResult<()>;

    /// Open `key` for reading. A missing key yields [`DatasourceError::NotFound`].
    async fn get(&self, key: &str, range: ByteRange) -> DatasourceResult<ByteStream>;

    /// Stored length of `key`, `None` if it does not exist.
    async fn size(&self, key: &str) -> DatasourceResult<Option<u64>>;

    /// Sum of the lengths of all stored objects.
    async fn full_size(&self) -> DatasourceResult<u64>;
}

/// Build the configured backend. Called once during startup.
pub fn from_config(cfg: &DatasourceConfig) -> DatasourceResult<SharedDatasource> {
    let datasource: SharedDatasource = match cfg {
        DatasourceConfig::Local(local) => Arc::new(LocalDatasource::new(&local.root)),
        DatasourceConfig::Supabase(supabase) => Arc::new(SupabaseDatasource::new(supabase)?),
    };
    tracing::info!(datasource = datasource.name(), "datasource selected");
    Ok(datasource)
}
