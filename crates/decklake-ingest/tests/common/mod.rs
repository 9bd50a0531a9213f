#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use decklake_fetch::{
    FetchRequest, Fetcher, RawResponse, SourcePolicy, Transport, TransportError,
};
use decklake_ingest::{
    Description, IngestError, ItemCallback, IterControl, ResolvedUpdateOptions, RunContext,
    SourceScraper, StoredItem,
};
use decklake_model::{builtin_registry, CardDesc, Collection, Game, Partition};
use decklake_store::RetryPolicy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const BASE: &str = "https://decks.test";

/// In-memory origin: listing pages, deck pages and scripted 503s.
#[derive(Default)]
pub struct FakeSite {
    pages: Mutex<HashMap<String, String>>,
    failures_left: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
}

impl FakeSite {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: impl Into<String>, body: impl Into<String>) {
        self.pages
            .lock()
            .expect("pages")
            .insert(url.into(), body.into());
    }

    /// Serves `decks` on listing page `page`, one deck per id with `cards`.
    pub fn listing(&self, page: usize, ids: &[String]) {
        let body = ids
            .iter()
            .map(|id| deck_url(id))
            .collect::<Vec<_>>()
            .join("\n");
        self.serve(list_url(page), body);
    }

    pub fn deck(&self, id: &str, cards: &[(u32, &str)]) {
        let body = cards
            .iter()
            .map(|(n, name)| format!("{n} {name}"))
            .collect::<Vec<_>>()
            .join("\n");
        self.serve(deck_url(id), body);
    }

    pub fn fail_first(&self, url: impl Into<String>, times: usize) {
        self.failures_left
            .lock()
            .expect("failures")
            .insert(url.into(), times);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeSite {
    async fn send(&self, request: &FetchRequest) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures_left.lock().expect("failures");
            if let Some(left) = failures.get_mut(&request.url) {
                if *left > 0 {
                    *left -= 1;
                    return Ok(RawResponse {
                        status: 503,
                        headers: Vec::new(),
                        body: b"busy".to_vec(),
                    });
                }
            }
        }
        let body = self.pages.lock().expect("pages").get(&request.url).cloned();
        Ok(match body {
            Some(body) => RawResponse {
                status: 200,
                headers: Vec::new(),
                body: body.into_bytes(),
            },
            None if request.url.contains("/list?") => RawResponse {
                status: 200,
                headers: Vec::new(),
                body: Vec::new(),
            },
            None => RawResponse {
                status: 404,
                headers: Vec::new(),
                body: Vec::new(),
            },
        })
    }
}

pub fn list_url(page: usize) -> String {
    format!("{BASE}/list?page={page}")
}

pub fn deck_url(id: &str) -> String {
    format!("{BASE}/deck/{id}")
}

pub fn ids(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("d{i:03}")).collect()
}

pub fn fetcher(site: Arc<FakeSite>) -> Arc<Fetcher> {
    let policy = SourcePolicy::new("fakedecks")
        .with_rate_limit(None)
        .with_retry(RetryPolicy::immediate(3));
    Arc::new(Fetcher::new(policy, site).expect("fetcher"))
}

/// Parses `"{count} {name}"` lines into a single `Main` partition.
#[derive(Default)]
pub struct LineScraper {
    pub tag: &'static str,
    /// Cancelled after this many parsed items, when set.
    pub cancel_after: Option<(RunContext, usize)>,
    pub parsed: AtomicUsize,
}

impl LineScraper {
    pub fn new() -> Self {
        Self {
            tag: "MagicDeck",
            ..Self::default()
        }
    }

    pub fn cancelling(ctx: RunContext, after: usize) -> Self {
        Self {
            cancel_after: Some((ctx, after)),
            ..Self::new()
        }
    }
}

#[async_trait]
impl SourceScraper for LineScraper {
    fn description(&self) -> Description {
        Description::new(Game::Magic, "fakedecks")
    }

    fn collection_tag(&self) -> &'static str {
        self.tag
    }

    async fn list_page(
        &self,
        fetcher: &Fetcher,
        page: usize,
        options: &ResolvedUpdateOptions,
    ) -> Result<Vec<String>, IngestError> {
        let resp = fetcher
            .fetch(&FetchRequest::get(list_url(page)), options.fetch_options())
            .await?;
        Ok(resp
            .text()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn item_id(&self, url: &str) -> Result<String, IngestError> {
        url.rsplit_once("/deck/")
            .map(|(_, id)| id.to_string())
            .ok_or_else(|| IngestError::parse(format!("not a deck url: {url}")))
    }

    async fn parse_item(
        &self,
        fetcher: &Fetcher,
        url: &str,
        options: &ResolvedUpdateOptions,
    ) -> Result<Collection, IngestError> {
        let resp = fetcher
            .fetch(&FetchRequest::get(url), options.fetch_options())
            .await?;
        let mut cards = Vec::new();
        for line in resp.text().lines().filter(|l| !l.trim().is_empty()) {
            let (count, name) = line
                .trim()
                .split_once(' ')
                .ok_or_else(|| IngestError::parse(format!("bad line {line:?}")))?;
            let count = count
                .parse()
                .map_err(|_| IngestError::parse(format!("bad count {line:?}")))?;
            cards.push(CardDesc::new(name, count));
        }
        let kind = builtin_registry().zero_value(self.tag)?;
        let date = Utc
            .with_ymd_and_hms(2025, 1, 18, 0, 0, 0)
            .single()
            .expect("date");
        let id = self.item_id(url)?;
        let collection = Collection::new(id, url, "", date, kind)
            .with_partition(Partition::new("Main", cards));
        let parsed = self.parsed.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((ctx, after)) = &self.cancel_after {
            if parsed >= *after {
                ctx.cancel();
            }
        }
        Ok(collection)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn callback(
    f: impl Fn(StoredItem) -> Result<IterControl, IngestError> + Send + Sync + 'static,
) -> ItemCallback {
    Arc::new(f)
}
