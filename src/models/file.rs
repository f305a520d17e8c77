//! Metadata record for an uploaded file.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Maps a public file name (also the datasource key) to what the raw server
/// needs to deliver it.
#[derive(Serialize, Clone, FromRow, Debug)]
pub struct FileRecord {
    pub id: Uuid,

    /// Generated name; doubles as the datasource object key.
    pub name: String,

    pub mimetype: String,

    /// Argon2 PHC hash when the file is password protected.
    #[serde(skip_serializing)]
    pub password: Option<String>,

    pub size: i64,

    pub views: i64,

    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn is_protected(&self) -> bool {
        self.password.is_some()
    }
}

/// Fields supplied when a record is created; the rest are defaulted.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub mimetype: String,
    pub password: Option<String>,
    pub size: i64,
}
