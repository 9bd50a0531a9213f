use crate::backend::{BlobMeta, BlobStore, ListPage};
use crate::error::{StoreError, StoreErrorCode};
use crate::key::{validate_key, validate_prefix};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// In-process store with call counters and write-failure injection.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
    fail_writes_under: Option<String>,
    pub read_calls: AtomicU64,
    pub write_calls: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write to a key under `prefix` fail with an I/O error.
    #[must_use]
    pub fn with_failing_writes(mut self, prefix: impl Into<String>) -> Self {
        self.fail_writes_under = Some(prefix.into());
        self
    }

    pub fn writes(&self) -> u64 {
        self.write_calls.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.blobs.lock().await.keys().cloned().collect()
    }

    /// Overrides a blob's modification time.
    pub async fn touch(&self, key: &str, modified: DateTime<Utc>) {
        if let Some(entry) = self.blobs.lock().await.get_mut(key) {
            entry.1 = modified;
        }
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        validate_key(key)?;
        self.read_calls.fetch_add(1, Ordering::Relaxed);
        self.blobs
            .lock()
            .await
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StoreError::not_found(key))
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(prefix) = &self.fail_writes_under {
            if key.starts_with(prefix.as_str()) {
                return Err(StoreError::new(
                    StoreErrorCode::Io,
                    format!("injected write failure for {key}"),
                ));
            }
        }
        self.blobs
            .lock()
            .await
            .insert(key.to_string(), (bytes.to_vec(), Utc::now()));
        Ok(())
    }

    async fn stat(&self, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        validate_key(key)?;
        Ok(self.blobs.lock().await.get(key).map(|(bytes, modified)| BlobMeta {
            size: bytes.len() as u64,
            modified: Some(*modified),
        }))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.blobs.lock().await.remove(key);
        Ok(())
    }

    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<ListPage, StoreError> {
        validate_prefix(prefix)?;
        let lower = match start_after {
            Some(cursor) if cursor >= prefix => Bound::Excluded(cursor.to_string()),
            _ => Bound::Included(prefix.to_string()),
        };
        let blobs = self.blobs.lock().await;
        let mut page = ListPage::default();
        for key in blobs
            .range((lower, Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
        {
            if page.keys.len() == limit {
                page.truncated = true;
                break;
            }
            page.keys.push(key.clone());
        }
        Ok(page)
    }
}
