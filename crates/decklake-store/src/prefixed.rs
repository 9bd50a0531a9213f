use crate::backend::{BlobMeta, BlobStore, ListPage, ListingSession};
use crate::error::StoreError;
use crate::key::validate_prefix;
use async_trait::async_trait;
use std::sync::Arc;

/// A view of `inner` rooted at `prefix`. Keys passed in and returned are
/// relative to the prefix; nothing is copied.
#[derive(Clone)]
pub struct PrefixedStore {
    inner: Arc<dyn BlobStore>,
    prefix: String,
}

/// Scopes `store` under `prefix` (`WithPrefix`). Nested views concatenate.
pub fn with_prefix(store: Arc<dyn BlobStore>, prefix: &str) -> Result<PrefixedStore, StoreError> {
    let prefix = prefix.trim_matches('/');
    validate_prefix(prefix)?;
    let prefix = if prefix.is_empty() {
        String::new()
    } else {
        format!("{prefix}/")
    };
    Ok(PrefixedStore {
        inner: store,
        prefix,
    })
}

impl PrefixedStore {
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn inner(&self) -> &Arc<dyn BlobStore> {
        &self.inner
    }

    fn full(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl BlobStore for PrefixedStore {
    fn backend_tag(&self) -> &'static str {
        self.inner.backend_tag()
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.read(&self.full(key)).await
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.write(&self.full(key), bytes).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(&self.full(key)).await
    }

    async fn stat(&self, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        self.inner.stat(&self.full(key)).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(&self.full(key)).await
    }

    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<ListPage, StoreError> {
        let cursor = start_after.map(|k| self.full(k));
        let page = self
            .inner
            .list_page(&self.full(prefix), cursor.as_deref(), limit)
            .await?;
        Ok(strip_page(page, &self.prefix))
    }

    fn listing_session(
        &self,
        prefix: &str,
        start_after: Option<&str>,
    ) -> Result<Option<Box<dyn ListingSession>>, StoreError> {
        let cursor = start_after.map(|k| self.full(k));
        let inner = self
            .inner
            .listing_session(&self.full(prefix), cursor.as_deref())?;
        Ok(inner.map(|inner| {
            Box::new(PrefixedListing {
                inner,
                prefix: self.prefix.clone(),
            }) as Box<dyn ListingSession>
        }))
    }
}

struct PrefixedListing {
    inner: Box<dyn ListingSession>,
    prefix: String,
}

#[async_trait]
impl ListingSession for PrefixedListing {
    async fn next_page(&mut self, limit: usize) -> Result<ListPage, StoreError> {
        let page = self.inner.next_page(limit).await?;
        Ok(strip_page(page, &self.prefix))
    }
}

fn strip_page(page: ListPage, prefix: &str) -> ListPage {
    ListPage {
        keys: page
            .keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(prefix).map(str::to_string))
            .collect(),
        truncated: page.truncated,
    }
}
