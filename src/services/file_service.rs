//! src/services/file_service.rs
//!
//! FileStore: SQLite-backed metadata for uploaded files. It never touches
//! object bytes; those belong to the configured datasource. Callers are
//! expected to write the object first and only then record it here, and to
//! remove the object before dropping its record.

use crate::models::file::{FileRecord, NewFile};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error("file `{0}` already exists")]
    AlreadyExists(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type FileStoreResult<T> = Result<T, FileStoreError>;

const FILE_COLUMNS: &str = "id, name, mimetype, password, size, views, created_at";

#[derive(Clone)]
pub struct FileStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,
}

impl FileStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Look up a record by its public name.
    pub async fn find_by_name(&self, name: &str) -> FileStoreResult<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&*self.db)
        .await?;
        Ok(record)
    }

    pub async fn insert(&self, new: NewFile) -> FileStoreResult<FileRecord> {
        sqlx::query_as::<_, FileRecord>(&format!(
            "INSERT INTO files (id, name, mimetype, password, size, views, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.mimetype)
        .bind(&new.password)
        .bind(new.size)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                FileStoreError::AlreadyExists(new.name.clone())
            } else {
                FileStoreError::Sqlx(err)
            }
        })
    }

    /// Add one view. Done in SQL so concurrent readers never lose a count.
    pub async fn increment_views(&self, id: Uuid) -> FileStoreResult<()> {
        let result = sqlx::query("UPDATE files SET views = views + 1 WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(FileStoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn delete_by_name(&self, name: &str) -> FileStoreResult<()> {
        let result = sqlx::query("DELETE FROM files WHERE name = ?")
            .bind(name)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(FileStoreError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// Drop every record, returning how many were removed.
    pub async fn delete_all(&self) -> FileStoreResult<u64> {
        let result = sqlx::query("DELETE FROM files").execute(&*self.db).await?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> FileStoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM files")
            .fetch_one(&*self.db)
            .await?;
        Ok(count)
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    async fn store() -> FileStore {
        FileStore::new(Arc::new(memory_pool().await))
    }

    fn new_file(name: &str) -> NewFile {
        NewFile {
            name: name.to_string(),
            mimetype: "image/png".to_string(),
            password: None,
            size: 10,
        }
    }

    #[tokio::test]
    async fn insert_then_find() {
        let files = store().await;
        let created = files.insert(new_file("xyz.png")).await.unwrap();
        assert_eq!(created.views, 0);

        let found = files.find_by_name("xyz.png").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.mimetype, "image/png");
        assert!(!found.is_protected());

        assert!(files.find_by_name("other.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected() {
        let files = store().await;
        files.insert(new_file("dup.png")).await.unwrap();
        let err = files.insert(new_file("dup.png")).await.unwrap_err();
        assert!(matches!(err, FileStoreError::AlreadyExists(name) if name == "dup.png"));
    }

    #[tokio::test]
    async fn increment_views_adds_exactly_one() {
        let files = store().await;
        let created = files.insert(new_file("v.png")).await.unwrap();

        files.increment_views(created.id).await.unwrap();
        files.increment_views(created.id).await.unwrap();

        let found = files.find_by_name("v.png").await.unwrap().unwrap();
        assert_eq!(found.views, 2);

        let err = files.increment_views(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, FileStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_by_name_and_delete_all() {
        let files = store().await;
        for name in ["a.png", "b.png", "c.png"] {
            files.insert(new_file(name)).await.unwrap();
        }

        files.delete_by_name("a.png").await.unwrap();
        assert!(matches!(
            files.delete_by_name("a.png").await.unwrap_err(),
            FileStoreError::NotFound(_)
        ));
        assert_eq!(files.count().await.unwrap(), 2);

        assert_eq!(files.delete_all().await.unwrap(), 2);
        assert_eq!(files.count().await.unwrap(), 0);
    }
}
