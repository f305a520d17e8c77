//! Local-disk datasource.
//!
//! Objects live flat under `root/{key}`. Writes go through a temporary file
//! that is fsynced and renamed into place, so a reader never observes a
//! half-written object.

use super::{ByteRange, ByteStream, Datasource, DatasourceError, DatasourceResult, stream};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const TMP_PREFIX: &str = ".tmp-";

#[derive(Debug, Clone)]
pub struct LocalDatasource {
    root: PathBuf,
}

impl LocalDatasource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Keys map straight onto file names, so anything that could escape
    /// `root` or collide with temp files is refused.
    fn ensure_key_safe(key: &str) -> DatasourceResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(DatasourceError::InvalidKey);
        }
        if key.starts_with('.') || key.contains('/') || key.contains("..") {
            return Err(DatasourceError::InvalidKey);
        }
        if key.bytes().any(|b| b.is_ascii_control() || b == b'\\') {
            return Err(DatasourceError::InvalidKey);
        }
        Ok(())
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Every stored object with its length. A missing root is an empty
    /// namespace.
    async fn entries(&self) -> DatasourceResult<Vec<(PathBuf, u64)>> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(TMP_PREFIX) {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_file() {
                entries.push((entry.path(), meta.len()));
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl Datasource for LocalDatasource {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn save(&self, key: &str, data: Bytes) -> DatasourceResult<()> {
        Self::ensure_key_safe(key)?;
        fs::create_dir_all(&self.root).await?;

        let file_path = self.object_path(key);
        let tmp_path = self.root.join(format!("{TMP_PREFIX}{}", Uuid::new_v4()));

        let written: io::Result<()> = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&data).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }

        debug!(%key, bytes = data.len(), "stored object on disk");
        Ok(())
    }

    async fn delete(&self, key: &str) -> DatasourceResult<()> {
        Self::ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(()) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    async fn clear(&self) -> DatasourceResult<()> {
        let entries = self.entries().await?;
        let count = entries.len();
        for (path, _) in entries {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        debug!(count, root = %self.root.display(), "cleared local datasource");
        Ok(())
    }

    async fn get(&self, key: &str, range: ByteRange) -> DatasourceResult<ByteStream> {
        Self::ensure_key_safe(key)?;
        let file = File::open(self.object_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                DatasourceError::NotFound {
                    key: key.to_string(),
                }
            } else {
                DatasourceError::Io(err)
            }
        })?;
        Ok(stream::from_file(file, range).await?)
    }

    async fn size(&self, key: &str) -> DatasourceResult<Option<u64>> {
        // A key that could never have been saved is simply absent.
        if Self::ensure_key_safe(key).is_err() {
            return Ok(None);
        }
        match fs::metadata(self.object_path(key)).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn full_size(&self) -> DatasourceResult<u64> {
        Ok(self.entries().await?.iter().map(|(_, len)| len).sum())
    }
}
