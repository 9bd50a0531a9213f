use crate::error::IngestError;
use crate::replay::{is_collection_key, load_collection};
use crate::stats::ERROR_SAMPLE_CAP;
use crate::tracker::ExportTracker;
use chrono::{DateTime, SecondsFormat, Utc};
use decklake_model::{Collection, Game};
use decklake_store::{BlobLister, BlobStore};
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// One flattened JSONL line.
///
/// `timestamp` and `created_at` repeat `scraped_at` for older consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeckRecord {
    pub deck_id: String,
    pub archetype: String,
    pub format: String,
    pub url: String,
    pub source: String,
    pub player: String,
    pub event: String,
    pub placement: u32,
    pub event_date: String,
    pub scraped_at: String,
    pub timestamp: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    pub cards: Vec<CardInDeck>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardInDeck {
    pub name: String,
    pub count: u32,
    pub partition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub exported: u64,
    /// Unchanged since the last export according to the tracker.
    pub unchanged: u64,
    /// Collections with no cards; never written.
    pub empty: u64,
    pub failed: u64,
    pub error_sample: Vec<String>,
}

impl ExportSummary {
    fn fail(&mut self, key: &str, err: &IngestError) {
        self.failed += 1;
        if self.error_sample.len() < ERROR_SAMPLE_CAP {
            self.error_sample.push(format!("{key}: {err}"));
        }
    }
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Flattens a collection, or `None` when it holds no cards.
#[must_use]
pub fn deck_record(key: &str, collection: &Collection, now: DateTime<Utc>) -> Option<DeckRecord> {
    let cards: Vec<CardInDeck> = collection
        .partitions
        .iter()
        .flat_map(|p| {
            p.cards.iter().map(|c| CardInDeck {
                name: c.name.clone(),
                count: c.count,
                partition: p.name.clone(),
            })
        })
        .collect();
    if cards.is_empty() {
        return None;
    }
    let deck = collection.kind.deck_fields();
    let text = |value: Option<&String>| value.cloned().unwrap_or_default();
    let scraped_at = rfc3339(collection.scraped_at.unwrap_or(now));
    let source = if collection.source.is_empty() {
        infer_source(&collection.url, key)
    } else {
        collection.source.clone()
    };
    Some(DeckRecord {
        deck_id: collection.id.clone(),
        archetype: text(deck.and_then(|d| d.archetype.as_ref())),
        format: text(deck.and_then(|d| d.format.as_ref())),
        url: collection.url.clone(),
        source,
        player: text(deck.and_then(|d| d.player.as_ref())),
        event: text(deck.and_then(|d| d.event.as_ref())),
        placement: deck.and_then(|d| d.placement).unwrap_or(0),
        event_date: deck
            .and_then(|d| d.event_date)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        timestamp: scraped_at.clone(),
        created_at: scraped_at.clone(),
        scraped_at,
        updated_at: collection.updated_at.map(rfc3339),
        version: collection.version,
        cards,
    })
}

const KNOWN_SOURCES: [(&str, &str); 6] = [
    ("mtgtop8", "mtgtop8"),
    ("goldfish", "goldfish"),
    ("deckbox", "deckbox"),
    ("limitless", "limitless-web"),
    ("ygoprodeck", "ygoprodeck-tournament"),
    ("scryfall", "scryfall"),
];

/// Source name for records stored without one: the source segment of a
/// `{game}/{source}/{id}` key, then known hosts in the URL, then known names
/// anywhere in the key, then the blob's parent directory.
#[must_use]
pub fn infer_source(url: &str, key: &str) -> String {
    let segments: Vec<&str> = key.split('/').collect();
    if let [game, source, _] = segments.as_slice() {
        if Game::parse(game).is_some() && !source.is_empty() {
            return (*source).to_string();
        }
    }
    let url = url.to_ascii_lowercase();
    let key_lower = key.to_ascii_lowercase();
    for haystack in [&url, &key_lower] {
        if let Some((_, source)) = KNOWN_SOURCES.iter().find(|(needle, _)| haystack.contains(needle)) {
            return (*source).to_string();
        }
    }
    match segments.len() {
        n if n >= 2 => segments[n - 2].to_string(),
        _ => "unknown".to_string(),
    }
}

/// Appends one JSON line per new or changed collection under `prefix` to
/// `out`, marking each in `tracker`. The tracker is not saved here.
#[instrument(name = "export_jsonl", skip(store, tracker, out))]
pub async fn export_jsonl<W: Write + Send>(
    store: Arc<dyn BlobStore>,
    prefix: &str,
    mut tracker: Option<&mut ExportTracker>,
    out: &mut W,
) -> Result<ExportSummary, IngestError> {
    let mut summary = ExportSummary::default();
    let mut lister = BlobLister::new(Arc::clone(&store), prefix);
    let now = Utc::now();
    while let Some(key) = lister.next_key().await? {
        if !is_collection_key(&key) {
            continue;
        }
        let disk_modified = match store.stat(&key).await {
            Ok(meta) => meta.and_then(|m| m.modified),
            Err(err) => {
                summary.fail(&key, &err.into());
                continue;
            }
        };
        let collection = match load_collection(store.as_ref(), &key).await {
            Ok(c) => c,
            Err(err) => {
                warn!(key = %key, error = %err, "export skipped unreadable blob");
                summary.fail(&key, &err);
                continue;
            }
        };
        if let Some(tracker) = tracker.as_deref_mut() {
            let updated = collection.updated_at.or(collection.scraped_at);
            if !tracker.should_export(&key, disk_modified, updated, collection.version) {
                summary.unchanged += 1;
                continue;
            }
        }
        let Some(record) = deck_record(&key, &collection, now) else {
            if let Some(tracker) = tracker.as_deref_mut() {
                tracker.discard_pending(&key);
            }
            summary.empty += 1;
            continue;
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| IngestError::parse(format!("encode export record: {e}")))?;
        writeln!(out, "{line}")
            .map_err(|e| IngestError::storage(format!("write export output: {e}")))?;
        summary.exported += 1;
        if let Some(tracker) = tracker.as_deref_mut() {
            tracker.mark_exported(&key);
        }
    }
    info!(
        exported = summary.exported,
        unchanged = summary.unchanged,
        empty = summary.empty,
        failed = summary.failed,
        "export finished"
    );
    Ok(summary)
}
