// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Per-source extraction runs, stored-item replay and incremental export.
//!
//! A [`Dataset`] scrapes one source into the blob store. Failures are
//! counted per item and per [`ErrorCategory`]; a run only fails outright on
//! configuration errors, detected before any network activity.

mod dataset;
mod error;
mod export;
mod options;
mod orchestrator;
mod replay;
mod scraper;
mod stats;
mod tracker;

pub const CRATE_NAME: &str = "decklake-ingest";

pub use dataset::{Dataset, Description, ItemCallback, RunContext, StoredItem};
pub use error::{ErrorCategory, IngestError};
pub use export::{deck_record, export_jsonl, infer_source, CardInDeck, DeckRecord, ExportSummary};
pub use options::{
    IterControl, IterItemsOption, ResolvedIterOptions, ResolvedUpdateOptions, UpdateOption,
    DEFAULT_EXTRACT_PARALLEL, DEFAULT_ITER_PARALLEL, MAX_PARALLEL,
};
pub use orchestrator::Orchestrator;
pub use replay::{is_collection_key, iter_items, load_collection, IterSummary};
pub use scraper::{ScrapedDataset, SourceScraper};
pub use stats::{ExtractStats, RunSummary, ERROR_SAMPLE_CAP};
pub use tracker::{ExportRecord, ExportTracker, TrackerStats, TRACKER_FILE};
