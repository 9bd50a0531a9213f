use crate::backend::{BlobStore, ListingSession, DEFAULT_PAGE_SIZE};
use crate::error::StoreError;
use std::collections::VecDeque;
use std::sync::Arc;

/// Lazy key sequence over a prefix, fetched one page at a time.
///
/// Holds at most one page in memory, plus whatever walk state the backend
/// keeps in its [`ListingSession`]. [`BlobLister::cursor`] returns the last
/// yielded key; passing it to [`BlobLister::resume_after`] continues the
/// sequence from the next key.
pub struct BlobLister {
    store: Arc<dyn BlobStore>,
    prefix: String,
    page_size: usize,
    cursor: Option<String>,
    buffer: VecDeque<String>,
    exhausted: bool,
    session: Option<Box<dyn ListingSession>>,
    opened: bool,
}

impl BlobLister {
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            page_size: DEFAULT_PAGE_SIZE,
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
            session: None,
            opened: false,
        }
    }

    #[must_use]
    pub fn resume_after(
        store: Arc<dyn BlobStore>,
        prefix: impl Into<String>,
        cursor: impl Into<String>,
    ) -> Self {
        let mut lister = Self::new(store, prefix);
        lister.cursor = Some(cursor.into());
        lister
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub async fn next_key(&mut self) -> Result<Option<String>, StoreError> {
        if self.buffer.is_empty() && !self.exhausted {
            if !self.opened {
                self.session = self
                    .store
                    .listing_session(&self.prefix, self.cursor.as_deref())?;
                self.opened = true;
            }
            let page = match self.session.as_mut() {
                Some(session) => session.next_page(self.page_size).await?,
                None => {
                    self.store
                        .list_page(&self.prefix, self.cursor.as_deref(), self.page_size)
                        .await?
                }
            };
            self.exhausted = !page.truncated || page.keys.is_empty();
            self.buffer.extend(page.keys);
        }
        let next = self.buffer.pop_front();
        if let Some(key) = &next {
            self.cursor = Some(key.clone());
        }
        Ok(next)
    }

    /// Drains the remaining keys; for small prefixes and tests.
    pub async fn collect_all(mut self) -> Result<Vec<String>, StoreError> {
        let mut out = Vec::new();
        while let Some(key) = self.next_key().await? {
            out.push(key);
        }
        Ok(out)
    }
}
