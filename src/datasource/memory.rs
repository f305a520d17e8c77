//! In-memory datasource for handler tests.

use super::{ByteRange, ByteStream, Datasource, DatasourceError, DatasourceResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

#[derive(Debug, Default)]
pub struct MemoryDatasource {
    objects: Mutex<BTreeMap<String, Bytes>>,
    pub fail_saves: AtomicBool,
    pub fail_deletes: AtomicBool,
    pub fail_listing: AtomicBool,
}

impl MemoryDatasource {
    pub fn insert(&self, key: &str, data: &'static [u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from_static(data));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn fail(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }

    fn provider_error(what: &str) -> DatasourceError {
        DatasourceError::Provider {
            error: "InternalError".into(),
            message: format!("{what} failed"),
        }
    }
}

#[async_trait]
impl Datasource for MemoryDatasource {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, key: &str, data: Bytes) -> DatasourceResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Self::provider_error("upload"));
        }
        self.objects.lock().unwrap().insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> DatasourceResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::provider_error("delete"));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn clear(&self) -> DatasourceResult<()> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Self::provider_error("list"));
        }
        self.objects.lock().unwrap().clear();
        Ok(())
    }

    async fn get(&self, key: &str, range: ByteRange) -> DatasourceResult<ByteStream> {
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| DatasourceError::NotFound {
                key: key.to_string(),
            })?;

        let len = data.len() as u64;
        let start = range.start.min(len) as usize;
        let end = range.end.map_or(len, |end| (end + 1).min(len)) as usize;
        let slice = data.slice(start..end.max(start));
        Ok(stream::once(async move { Ok(slice) }).boxed())
    }

    async fn size(&self, key: &str) -> DatasourceResult<Option<u64>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Self::provider_error("list"));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .map(|data| data.len() as u64))
    }

    async fn full_size(&self) -> DatasourceResult<u64> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Self::provider_error("list"));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .values()
            .map(|data| data.len() as u64)
            .sum())
    }
}
