// SPDX-License-Identifier: Apache-2.0

use crate::dataset::RunContext;
use crate::error::{ErrorCategory, IngestError};
use crate::options::ResolvedUpdateOptions;
use crate::scraper::SourceScraper;
use crate::stats::{ExtractStats, RunSummary};
use chrono::Utc;
use decklake_fetch::Fetcher;
use decklake_model::builtin_registry;
use decklake_store::{codec, collection_key, BlobStore};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone)]
struct WorkItem {
    url: String,
    key: String,
}

enum Outcome {
    Written { normalized: bool },
    Skipped,
}

/// State shared by the workers of one run.
struct Shared<S> {
    scraper: Arc<S>,
    fetcher: Arc<Fetcher>,
    store: Arc<dyn BlobStore>,
    options: Arc<ResolvedUpdateOptions>,
    stats: Arc<ExtractStats>,
    ctx: RunContext,
    source: String,
}

impl<S> Shared<S> {
    fn should_stop(&self) -> bool {
        self.ctx.is_cancelled()
            || self
                .options
                .item_limit
                .is_some_and(|limit| self.stats.succeeded() >= limit as u64)
    }
}

/// Drives one source: listing, dedup, then a bounded worker pool.
pub struct Orchestrator {
    store: Arc<dyn BlobStore>,
    compress: bool,
}

impl Orchestrator {
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            compress: true,
        }
    }

    #[must_use]
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Listing finishes before any item is processed. Items are then pulled
    /// from a queue bounded by `options.parallel` by as many workers; each
    /// key is enqueued at most once.
    #[instrument(name = "extract", skip_all, fields(source = %scraper.description()))]
    pub async fn extract<S: SourceScraper>(
        &self,
        ctx: &RunContext,
        scraper: Arc<S>,
        fetcher: Arc<Fetcher>,
        options: Arc<ResolvedUpdateOptions>,
    ) -> Result<RunSummary, IngestError> {
        builtin_registry().ensure_registered(scraper.collection_tag())?;
        let desc = scraper.description();
        let stats = Arc::new(ExtractStats::default());
        info!(
            parallel = options.parallel,
            reparse = options.reparse,
            replace = options.fetch_replace_all,
            "extraction started"
        );

        let urls = list_urls(ctx, scraper.as_ref(), &fetcher, &options, &stats).await;
        let work = self.dedup(scraper.as_ref(), urls, &stats);
        stats.add_total(work.len() as u64);
        info!(items = work.len(), "listing complete");

        let shared = Arc::new(Shared {
            scraper,
            fetcher,
            store: Arc::clone(&self.store),
            options: Arc::clone(&options),
            stats: Arc::clone(&stats),
            ctx: ctx.clone(),
            source: desc.name.clone(),
        });
        let (tx, rx) = mpsc::channel::<WorkItem>(options.parallel);
        let rx = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();
        for _ in 0..options.parallel.min(work.len().max(1)) {
            workers.spawn(worker(Arc::clone(&shared), Arc::clone(&rx)));
        }
        drop(rx);
        for item in work {
            if shared.should_stop() || tx.send(item).await.is_err() {
                break;
            }
        }
        drop(tx);
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "extraction worker aborted");
            }
        }

        let summary = stats.summary(&desc.name, ctx.is_cancelled());
        let storage_failures = stats.failures_in(ErrorCategory::Storage);
        if storage_failures > 0 {
            error!(
                storage_failures,
                "blob store writes failed; the backend may be unavailable"
            );
        }
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "extraction finished"
        );
        Ok(summary)
    }

    /// One work item per distinct key, in first-seen order. URLs without a
    /// usable id count as failed items.
    fn dedup<S: SourceScraper>(
        &self,
        scraper: &S,
        urls: Vec<String>,
        stats: &ExtractStats,
    ) -> Vec<WorkItem> {
        let desc = scraper.description();
        let mut seen = HashSet::new();
        let mut work = Vec::with_capacity(urls.len());
        for url in urls {
            let id = match scraper.item_id(&url) {
                Ok(id) if !id.trim().is_empty() => id,
                Ok(_) => {
                    stats.add_total(1);
                    stats.record_failure(&url, &IngestError::parse("empty item id"));
                    continue;
                }
                Err(err) => {
                    stats.add_total(1);
                    stats.record_failure(&url, &err);
                    continue;
                }
            };
            let key = collection_key(desc.game.as_str(), &desc.name, &id, self.compress);
            if seen.insert(key.clone()) {
                work.push(WorkItem { url, key });
            }
        }
        work
    }
}

async fn list_urls<S: SourceScraper>(
    ctx: &RunContext,
    scraper: &S,
    fetcher: &Fetcher,
    options: &ResolvedUpdateOptions,
    stats: &ExtractStats,
) -> Vec<String> {
    if !options.item_only_urls.is_empty() {
        return options.item_only_urls.clone();
    }
    let mut urls = Vec::new();
    let mut page = options.scroll_start;
    let mut pages_listed = 0;
    while !ctx.is_cancelled() {
        if options.scroll_limit.is_some_and(|limit| pages_listed >= limit) {
            debug!(page, "scroll limit reached");
            break;
        }
        match scraper.list_page(fetcher, page, options).await {
            Ok(found) if found.is_empty() => break,
            Ok(found) => {
                debug!(page, items = found.len(), "listed page");
                urls.extend(found);
            }
            Err(err) => {
                warn!(page, error = %err, "listing failed, keeping items found so far");
                stats.record_listing_failure(page, &err);
                break;
            }
        }
        pages_listed += 1;
        page += 1;
    }
    urls
}

async fn worker<S: SourceScraper>(
    shared: Arc<Shared<S>>,
    queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
) {
    loop {
        if shared.should_stop() {
            break;
        }
        let next = queue.lock().await.recv().await;
        let Some(item) = next else {
            break;
        };
        if shared.should_stop() {
            break;
        }
        match process(&shared, &item).await {
            Ok(Outcome::Written { normalized }) => shared.stats.record_success(normalized),
            Ok(Outcome::Skipped) => shared.stats.record_skip(),
            Err(err) => {
                warn!(
                    url = %item.url,
                    category = err.category.as_str(),
                    error = %err,
                    "item failed"
                );
                shared.stats.record_failure(&item.url, &err);
            }
        }
    }
}

async fn process<S: SourceScraper>(
    shared: &Shared<S>,
    item: &WorkItem,
) -> Result<Outcome, IngestError> {
    if !shared.options.overwrite_existing() && shared.store.exists(&item.key).await? {
        debug!(key = %item.key, "already stored");
        return Ok(Outcome::Skipped);
    }
    let mut collection = shared
        .scraper
        .parse_item(&shared.fetcher, &item.url, &shared.options)
        .await?;
    if collection.source.is_empty() {
        collection.source = shared.source.clone();
    }
    if collection.scraped_at.is_none() {
        collection.scraped_at = Some(Utc::now());
    }
    let report = collection.canonicalize()?;
    let json = collection.to_json()?;
    let bytes = codec::encode_for_key(&item.key, &json)?;
    shared.store.write(&item.key, &bytes).await?;
    debug!(key = %item.key, cards = collection.card_total(), "stored collection");
    Ok(Outcome::Written {
        normalized: !report.is_unchanged(),
    })
}
