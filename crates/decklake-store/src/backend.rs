// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub const DEFAULT_PAGE_SIZE: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// One page of a listing, in the backend's stable key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Set when more keys may follow the last one in `keys`.
    pub truncated: bool,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Stores `bytes` under `key`. Readers observe either the previous value
    /// or the new one, never a partial write.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.stat(key).await?.is_some())
    }

    async fn stat(&self, key: &str) -> Result<Option<BlobMeta>, StoreError>;

    /// Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Up to `limit` keys starting with `prefix` and ordered after
    /// `start_after`.
    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<ListPage, StoreError>;

    /// Opens a listing that keeps its walk position between pages, for
    /// backends where `list_page` would have to rescan up to the cursor.
    /// `None` means paging through `list_page` is already cheap.
    fn listing_session(
        &self,
        _prefix: &str,
        _start_after: Option<&str>,
    ) -> Result<Option<Box<dyn ListingSession>>, StoreError> {
        Ok(None)
    }
}

/// Stateful continuation of one listing; each call resumes where the previous
/// page stopped.
#[async_trait]
pub trait ListingSession: Send {
    async fn next_page(&mut self, limit: usize) -> Result<ListPage, StoreError>;
}
