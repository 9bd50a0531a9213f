use crate::error::{ErrorCategory, IngestError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub const ERROR_SAMPLE_CAP: usize = 10;

/// Counters shared by every worker of one run.
#[derive(Debug, Default)]
pub struct ExtractStats {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    normalized: AtomicU64,
    listing_failures: AtomicU64,
    by_category: Mutex<BTreeMap<ErrorCategory, u64>>,
    sample: Mutex<Vec<String>>,
}

impl ExtractStats {
    pub fn add_total(&self, n: u64) {
        self.total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_success(&self, normalized: bool) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        if normalized {
            self.normalized.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, url: &str, err: &IngestError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.note(url, err);
    }

    /// A listing page that could not be fetched or parsed. Not an item.
    pub fn record_listing_failure(&self, page: usize, err: &IngestError) {
        self.listing_failures.fetch_add(1, Ordering::Relaxed);
        self.note(&format!("listing page {page}"), err);
    }

    fn note(&self, subject: &str, err: &IngestError) {
        if let Ok(mut by_category) = self.by_category.lock() {
            *by_category.entry(err.category).or_insert(0) += 1;
        }
        if let Ok(mut sample) = self.sample.lock() {
            if sample.len() < ERROR_SAMPLE_CAP {
                sample.push(format!("{subject}: {err}"));
            }
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failures_in(&self, category: ErrorCategory) -> u64 {
        self.by_category
            .lock()
            .ok()
            .and_then(|m| m.get(&category).copied())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn summary(&self, source: &str, cancelled: bool) -> RunSummary {
        RunSummary {
            source: source.to_string(),
            total: self.total.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            normalized: self.normalized.load(Ordering::Relaxed),
            listing_failures: self.listing_failures.load(Ordering::Relaxed),
            failures_by_category: self
                .by_category
                .lock()
                .map(|m| m.iter().map(|(k, v)| (k.as_str().to_string(), *v)).collect())
                .unwrap_or_default(),
            error_sample: self.sample.lock().map(|s| s.clone()).unwrap_or_default(),
            cancelled,
        }
    }
}

/// Outcome of one extraction run.
///
/// `total` counts unique items after dedup; items never picked up because
/// of an item limit or cancellation appear in no other counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub source: String,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Succeeded items that canonicalization rewrote.
    pub normalized: u64,
    pub listing_failures: u64,
    pub failures_by_category: BTreeMap<String, u64>,
    pub error_sample: Vec<String>,
    pub cancelled: bool,
}
