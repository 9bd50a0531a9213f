use crate::dataset::{Dataset, Description, ItemCallback, RunContext};
use crate::error::IngestError;
use crate::options::{IterItemsOption, ResolvedIterOptions, ResolvedUpdateOptions, UpdateOption};
use crate::orchestrator::Orchestrator;
use crate::replay::{iter_items, IterSummary};
use crate::stats::RunSummary;
use async_trait::async_trait;
use decklake_fetch::Fetcher;
use decklake_model::{builtin_registry, Collection};
use decklake_store::BlobStore;
use std::sync::Arc;

/// Site-specific listing and parsing for one source.
///
/// Implementations fetch through the supplied [`Fetcher`] with
/// `options.fetch_options()` so that cache and replace flags apply.
#[async_trait]
pub trait SourceScraper: Send + Sync + 'static {
    fn description(&self) -> Description;

    /// Type tag of the collections this source produces.
    fn collection_tag(&self) -> &'static str;

    /// Item URLs on listing page `page`. An empty page ends the listing.
    async fn list_page(
        &self,
        fetcher: &Fetcher,
        page: usize,
        options: &ResolvedUpdateOptions,
    ) -> Result<Vec<String>, IngestError>;

    /// Source-local collection id for an item URL.
    fn item_id(&self, url: &str) -> Result<String, IngestError>;

    async fn parse_item(
        &self,
        fetcher: &Fetcher,
        url: &str,
        options: &ResolvedUpdateOptions,
    ) -> Result<Collection, IngestError>;
}

/// [`Dataset`] over any [`SourceScraper`], storing one blob per item.
pub struct ScrapedDataset<S> {
    scraper: Arc<S>,
    store: Arc<dyn BlobStore>,
    compress: bool,
}

impl<S: SourceScraper> ScrapedDataset<S> {
    /// Fails when the scraper's type tag is not registered.
    pub fn new(scraper: S, store: Arc<dyn BlobStore>) -> Result<Self, IngestError> {
        builtin_registry().ensure_registered(scraper.collection_tag())?;
        Ok(Self {
            scraper: Arc::new(scraper),
            store,
            compress: true,
        })
    }

    /// Store plain `.json` blobs instead of `.json.zst`.
    #[must_use]
    pub fn uncompressed(mut self) -> Self {
        self.compress = false;
        self
    }

    #[must_use]
    pub fn scraper(&self) -> &S {
        &self.scraper
    }
}

#[async_trait]
impl<S: SourceScraper> Dataset for ScrapedDataset<S> {
    fn description(&self) -> Description {
        self.scraper.description()
    }

    async fn extract(
        &self,
        ctx: &RunContext,
        fetcher: Arc<Fetcher>,
        options: &[UpdateOption],
    ) -> Result<RunSummary, IngestError> {
        let resolved = ResolvedUpdateOptions::resolve(options)?;
        Orchestrator::new(Arc::clone(&self.store))
            .with_compression(self.compress)
            .extract(ctx, Arc::clone(&self.scraper), fetcher, Arc::new(resolved))
            .await
    }

    async fn iter_items(
        &self,
        ctx: &RunContext,
        callback: ItemCallback,
        options: &[IterItemsOption],
    ) -> Result<IterSummary, IngestError> {
        let resolved = ResolvedIterOptions::resolve(options)?;
        let prefix = self.description().key_prefix();
        iter_items(Arc::clone(&self.store), &prefix, ctx, callback, resolved).await
    }
}
