// SPDX-License-Identifier: Apache-2.0

use crate::attributes::{AttributeTable, CardAttributes};
use crate::csv::field;
use decklake_ingest::{
    Dataset, IngestError, IterControl, IterItemsOption, RunContext, StoredItem,
    DEFAULT_ITER_PARALLEL,
};
use decklake_model::{Collection, CollectionType};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

pub const EDGES_HEADER: &str = "NAME_1,NAME_2,COUNT_SET,COUNT_MULTISET";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EdgeCounts {
    /// Partitions in which both cards appear.
    pub set: u64,
    /// Sum of count products; self-pairs add `n*(n-1)/2` for `n` copies.
    pub multiset: u64,
}

/// Which collections feed the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionFilter {
    /// Only these sources, when set.
    pub sources: Option<BTreeSet<String>>,
    /// Skip sets, cubes and binders, whose cards were printed or stored
    /// together rather than played together.
    pub decks_only: bool,
}

impl CollectionFilter {
    #[must_use]
    pub fn decks_only() -> Self {
        Self {
            sources: None,
            decks_only: true,
        }
    }

    #[must_use]
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn accepts(&self, collection: &Collection) -> bool {
        if self.decks_only && !collection.kind.is_deck() {
            return false;
        }
        self.sources
            .as_ref()
            .map_or(true, |sources| sources.contains(&collection.source))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    /// Items read across all datasets; `None` reads everything.
    pub limit: Option<usize>,
    pub parallel: usize,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            limit: None,
            parallel: DEFAULT_ITER_PARALLEL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransformSummary {
    pub collections: u64,
    pub filtered_out: u64,
    pub unreadable: u64,
    pub edges: usize,
}

type PairKey = (String, String);

/// Accumulates co-occurrence edges over many collections.
///
/// Edges live in a sparse map keyed by the ordered name pair, so memory
/// grows with observed pairs rather than vocabulary squared.
#[derive(Debug, Default)]
pub struct CooccurrenceTransform {
    filter: CollectionFilter,
    edges: Mutex<BTreeMap<PairKey, EdgeCounts>>,
    attributes: AttributeTable,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl CooccurrenceTransform {
    #[must_use]
    pub fn new(filter: CollectionFilter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Adds every partition of `collection`. Returns false when the filter
    /// rejected it. Card facts carried by a set are recorded whether or not
    /// the set itself feeds the graph.
    pub fn add_collection(&self, collection: &Collection) -> Result<bool, IngestError> {
        if let CollectionType::MagicSet(set) = &collection.kind {
            for card in &set.cards {
                self.attributes.record(
                    &card.name,
                    CardAttributes {
                        cmc: card.cmc,
                        type_line: card.type_line.clone(),
                    },
                );
            }
        }
        if !self.filter.accepts(collection) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }
        let mut local: BTreeMap<PairKey, EdgeCounts> = BTreeMap::new();
        for partition in &collection.partitions {
            let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
            for card in partition.cards.iter().filter(|c| c.count > 0) {
                *counts.entry(card.name.as_str()).or_insert(0) += u64::from(card.count);
            }
            let entries: Vec<(&str, u64)> = counts.into_iter().collect();
            for (i, &(a, count_a)) in entries.iter().enumerate() {
                if count_a > 1 {
                    let edge = local.entry((a.to_string(), a.to_string())).or_default();
                    edge.multiset += count_a * (count_a - 1) / 2;
                }
                for &(b, count_b) in &entries[i + 1..] {
                    let edge = local.entry((a.to_string(), b.to_string())).or_default();
                    edge.set += 1;
                    edge.multiset += count_a * count_b;
                }
            }
        }
        let mut edges = self
            .edges
            .lock()
            .map_err(|_| IngestError::storage("co-occurrence edge map poisoned"))?;
        for (key, delta) in local {
            let edge = edges.entry(key).or_default();
            edge.set += delta.set;
            edge.multiset += delta.multiset;
        }
        drop(edges);
        self.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    pub fn record_attributes(&self, name: &str, attributes: CardAttributes) {
        self.attributes.record(name, attributes);
    }

    #[must_use]
    pub fn attributes(&self) -> &AttributeTable {
        &self.attributes
    }

    /// Replays every dataset into the graph. Unreadable blobs are counted
    /// and skipped; a dataset replay error stops the run. `options.limit`
    /// bounds the items read over the whole run, so later datasets get
    /// whatever the earlier ones left.
    #[instrument(name = "cooccurrence_run", skip_all, fields(datasets = datasets.len()))]
    pub async fn run(
        self: &Arc<Self>,
        ctx: &RunContext,
        datasets: &[Arc<dyn Dataset>],
        options: TransformOptions,
    ) -> Result<TransformSummary, IngestError> {
        let mut unreadable = 0;
        let mut read = 0;
        for dataset in datasets {
            if ctx.is_cancelled() {
                break;
            }
            let mut iter_options = vec![IterItemsOption::Parallel(options.parallel)];
            if let Some(limit) = options.limit {
                let remaining = limit.saturating_sub(read);
                if remaining == 0 {
                    break;
                }
                iter_options.push(IterItemsOption::Limit(remaining));
            }
            let sink = Arc::clone(self);
            let replay = dataset
                .iter_items(
                    ctx,
                    Arc::new(move |item: StoredItem| -> Result<IterControl, IngestError> {
                        sink.add_collection(&item.collection)?;
                        Ok(IterControl::Continue)
                    }),
                    &iter_options,
                )
                .await?;
            unreadable += replay.failed;
            read += usize::try_from(replay.delivered).unwrap_or(usize::MAX);
            info!(
                source = %dataset.description(),
                delivered = replay.delivered,
                failed = replay.failed,
                "dataset replayed"
            );
        }
        let summary = TransformSummary {
            collections: self.accepted.load(Ordering::Relaxed),
            filtered_out: self.rejected.load(Ordering::Relaxed),
            unreadable,
            edges: self.len(),
        };
        info!(
            collections = summary.collections,
            edges = summary.edges,
            "co-occurrence transform finished"
        );
        Ok(summary)
    }

    /// Edge between two cards, in either order.
    #[must_use]
    pub fn edge(&self, a: &str, b: &str) -> Option<EdgeCounts> {
        let key = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        self.edges.lock().ok()?.get(&key).copied()
    }

    /// All edges sorted by `(name_1, name_2)` with `name_1 <= name_2`.
    #[must_use]
    pub fn edges(&self) -> Vec<(String, String, EdgeCounts)> {
        self.edges
            .lock()
            .map(|edges| {
                edges
                    .iter()
                    .map(|((a, b), counts)| (a.clone(), b.clone(), *counts))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.lock().map(|e| e.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes the graph as CSV. Returns the number of rows after the header.
    pub fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<usize> {
        let edges = self
            .edges
            .lock()
            .map_err(|_| io::Error::other("edge map poisoned"))?;
        writeln!(out, "{EDGES_HEADER}")?;
        for ((a, b), counts) in edges.iter() {
            writeln!(
                out,
                "{},{},{},{}",
                field(a),
                field(b),
                counts.set,
                counts.multiset
            )?;
        }
        Ok(edges.len())
    }
}
