// SPDX-License-Identifier: Apache-2.0

use crate::error::IngestError;
use chrono::{DateTime, Duration, Utc};
use decklake_store::BlobStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const TRACKER_FILE: &str = "export_tracker.json";
const SNAPSHOT_VERSION: u32 = 1;

/// What was known about a key when it was last exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub exported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_version: Option<u64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: BTreeMap<String, ExportRecord>,
}

#[derive(Debug, Clone, Copy, Default)]
struct PendingMeta {
    disk_modified: Option<DateTime<Utc>>,
    source_updated_at: Option<DateTime<Utc>>,
    source_version: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackerStats {
    pub total: usize,
    /// Keys exported within the last 24 hours.
    pub recent: usize,
}

/// Per-source record of exported keys, persisted as one snapshot blob.
///
/// `mark_exported` only updates memory; `save` writes the whole snapshot
/// once. The snapshot is mutated by one writer after the parallel phase of
/// a run, never concurrently.
pub struct ExportTracker {
    store: Arc<dyn BlobStore>,
    snapshot_key: String,
    entries: BTreeMap<String, ExportRecord>,
    pending: HashMap<String, PendingMeta>,
}

impl ExportTracker {
    /// Tracker state lives at `{prefix}/export_tracker.json`.
    #[must_use]
    pub fn new(store: Arc<dyn BlobStore>, prefix: &str) -> Self {
        let prefix = prefix.trim_matches('/');
        let snapshot_key = if prefix.is_empty() {
            TRACKER_FILE.to_string()
        } else {
            format!("{prefix}/{TRACKER_FILE}")
        };
        Self {
            store,
            snapshot_key,
            entries: BTreeMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Creates a tracker and loads prior state, starting empty if that fails.
    pub async fn open(store: Arc<dyn BlobStore>, prefix: &str) -> Self {
        let mut tracker = Self::new(store, prefix);
        if let Err(err) = tracker.load().await {
            warn!(key = %tracker.snapshot_key, error = %err, "export tracker state unusable, starting fresh");
        }
        tracker
    }

    #[must_use]
    pub fn snapshot_key(&self) -> &str {
        &self.snapshot_key
    }

    /// Replaces in-memory state with the stored snapshot.
    ///
    /// A missing snapshot loads as empty. On any other failure the state is
    /// left empty and the error returned, so callers re-export everything.
    #[instrument(name = "tracker_load", skip(self), fields(key = %self.snapshot_key))]
    pub async fn load(&mut self) -> Result<usize, IngestError> {
        self.entries.clear();
        self.pending.clear();
        let bytes = match self.store.read(&self.snapshot_key).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| IngestError::parse(format!("corrupt export tracker: {e}")))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(IngestError::parse(format!(
                "unsupported export tracker version {}",
                snapshot.version
            )));
        }
        self.entries = snapshot.entries;
        debug!(entries = self.entries.len(), "export tracker loaded");
        Ok(self.entries.len())
    }

    /// True when `key` was never exported, when the source reports a newer
    /// version or update time than recorded, or, with no source metadata,
    /// when the blob changed on disk after the last export.
    ///
    /// A `true` answer remembers the metadata for the next `mark_exported`.
    pub fn should_export(
        &mut self,
        key: &str,
        disk_modified: Option<DateTime<Utc>>,
        source_updated_at: Option<DateTime<Utc>>,
        source_version: Option<u64>,
    ) -> bool {
        let export = match self.entries.get(key) {
            None => true,
            Some(last) => is_newer(last, disk_modified, source_updated_at, source_version),
        };
        if export {
            self.pending.insert(
                key.to_string(),
                PendingMeta {
                    disk_modified,
                    source_updated_at,
                    source_version,
                },
            );
        }
        export
    }

    pub fn mark_exported(&mut self, key: &str) {
        self.mark_exported_at(key, Utc::now());
    }

    pub fn mark_exported_at(&mut self, key: &str, at: DateTime<Utc>) {
        let meta = self.pending.remove(key).unwrap_or_default();
        self.entries.insert(
            key.to_string(),
            ExportRecord {
                exported_at: at,
                disk_modified: meta.disk_modified,
                source_updated_at: meta.source_updated_at,
                source_version: meta.source_version,
            },
        );
    }

    /// Forgets metadata remembered by `should_export` for a key that ended up
    /// not being exported.
    pub fn discard_pending(&mut self, key: &str) {
        self.pending.remove(key);
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn record(&self, key: &str) -> Option<&ExportRecord> {
        self.entries.get(key)
    }

    /// Writes the full snapshot. Last writer wins.
    #[instrument(name = "tracker_save", skip(self), fields(key = %self.snapshot_key))]
    pub async fn save(&self) -> Result<(), IngestError> {
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            entries: &self.entries,
        };
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| IngestError::storage(format!("encode export tracker: {e}")))?;
        self.store.write(&self.snapshot_key, &bytes).await?;
        debug!(entries = self.entries.len(), "export tracker saved");
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        self.stats_at(Utc::now())
    }

    #[must_use]
    pub fn stats_at(&self, now: DateTime<Utc>) -> TrackerStats {
        let cutoff = now - Duration::hours(24);
        TrackerStats {
            total: self.entries.len(),
            recent: self
                .entries
                .values()
                .filter(|r| r.exported_at > cutoff)
                .count(),
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    entries: &'a BTreeMap<String, ExportRecord>,
}

fn is_newer(
    last: &ExportRecord,
    disk_modified: Option<DateTime<Utc>>,
    source_updated_at: Option<DateTime<Utc>>,
    source_version: Option<u64>,
) -> bool {
    if let Some(version) = source_version {
        if last.source_version.map_or(true, |seen| version > seen) {
            return true;
        }
    }
    if let Some(updated) = source_updated_at {
        let baseline = last.source_updated_at.unwrap_or(last.exported_at);
        return updated > baseline;
    }
    if source_version.is_some() {
        return false;
    }
    disk_modified.is_some_and(|modified| modified > last.exported_at)
}
