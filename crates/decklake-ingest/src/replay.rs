use crate::dataset::{ItemCallback, RunContext, StoredItem};
use crate::error::IngestError;
use crate::options::{IterControl, ResolvedIterOptions};
use crate::tracker::TRACKER_FILE;
use decklake_model::Collection;
use decklake_store::{codec, BlobLister, BlobStore};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IterSummary {
    pub delivered: u64,
    /// Blobs that could not be read or decoded; replay continues past them.
    pub failed: u64,
    /// The callback asked to stop, or the item limit was reached.
    pub stopped: bool,
    pub cancelled: bool,
}

#[derive(Default)]
struct ReplayState {
    limit: Option<usize>,
    claimed: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    stopped: AtomicBool,
    callback_error: std::sync::Mutex<Option<IngestError>>,
}

impl ReplayState {
    fn halted(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
            || self
                .callback_error
                .lock()
                .map(|e| e.is_some())
                .unwrap_or(true)
    }

    fn fail_with(&self, err: IngestError) {
        if let Ok(mut slot) = self.callback_error.lock() {
            slot.get_or_insert(err);
        }
    }
}

/// Collection blobs, excluding tracker snapshots stored alongside them.
#[must_use]
pub fn is_collection_key(key: &str) -> bool {
    let file = key.rsplit('/').next().unwrap_or(key);
    file != TRACKER_FILE && (file.ends_with(".json") || file.ends_with(".json.zst"))
}

pub async fn load_collection(store: &dyn BlobStore, key: &str) -> Result<Collection, IngestError> {
    let bytes = store.read(key).await?;
    let json = codec::decode_for_key(key, &bytes)?;
    Ok(Collection::from_json(&json)?)
}

/// Streams every collection under `prefix` into `callback` with bounded
/// parallelism.
///
/// Keys are listed lazily. A callback error ends the replay and is
/// returned; [`IterControl::Stop`] ends it successfully.
#[instrument(name = "iter_items", skip(store, ctx, callback, options))]
pub async fn iter_items(
    store: Arc<dyn BlobStore>,
    prefix: &str,
    ctx: &RunContext,
    callback: ItemCallback,
    options: ResolvedIterOptions,
) -> Result<IterSummary, IngestError> {
    let state = Arc::new(ReplayState {
        limit: options.limit,
        ..ReplayState::default()
    });
    let (tx, rx) = mpsc::channel::<String>(options.parallel);
    let rx = Arc::new(Mutex::new(rx));
    let mut workers = JoinSet::new();
    for _ in 0..options.parallel {
        workers.spawn(replay_worker(
            Arc::clone(&store),
            Arc::clone(&rx),
            Arc::clone(&state),
            Arc::clone(&callback),
            ctx.clone(),
        ));
    }
    drop(rx);

    let mut lister = BlobLister::new(Arc::clone(&store), prefix);
    let mut listing_error = None;
    while !ctx.is_cancelled() && !state.halted() {
        match lister.next_key().await {
            Ok(Some(key)) if is_collection_key(&key) => {
                if tx.send(key).await.is_err() {
                    break;
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(err) => {
                listing_error = Some(err);
                break;
            }
        }
    }
    drop(tx);
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            error!(error = %err, "replay worker aborted");
        }
    }

    let callback_error = state.callback_error.lock().ok().and_then(|mut e| e.take());
    if let Some(err) = callback_error {
        return Err(err);
    }
    if let Some(err) = listing_error {
        return Err(err.into());
    }
    let summary = IterSummary {
        delivered: state.delivered.load(Ordering::SeqCst),
        failed: state.failed.load(Ordering::SeqCst),
        stopped: state.stopped.load(Ordering::SeqCst),
        cancelled: ctx.is_cancelled(),
    };
    debug!(
        delivered = summary.delivered,
        failed = summary.failed,
        stopped = summary.stopped,
        "replay finished"
    );
    Ok(summary)
}

async fn replay_worker(
    store: Arc<dyn BlobStore>,
    queue: Arc<Mutex<mpsc::Receiver<String>>>,
    state: Arc<ReplayState>,
    callback: ItemCallback,
    ctx: RunContext,
) {
    loop {
        if ctx.is_cancelled() || state.halted() {
            break;
        }
        let next = queue.lock().await.recv().await;
        let Some(key) = next else {
            break;
        };
        let collection = match load_collection(store.as_ref(), &key).await {
            Ok(collection) => collection,
            Err(err) => {
                warn!(key = %key, error = %err, "skipping unreadable blob");
                state.failed.fetch_add(1, Ordering::SeqCst);
                continue;
            }
        };
        if let Some(limit) = state.limit {
            if state.claimed.fetch_add(1, Ordering::SeqCst) >= limit as u64 {
                state.stopped.store(true, Ordering::SeqCst);
                break;
            }
        }
        match callback(StoredItem { key, collection }) {
            Ok(IterControl::Continue) => {
                state.delivered.fetch_add(1, Ordering::SeqCst);
            }
            Ok(IterControl::Stop) => {
                state.delivered.fetch_add(1, Ordering::SeqCst);
                state.stopped.store(true, Ordering::SeqCst);
                break;
            }
            Err(err) => {
                state.fail_with(err);
                break;
            }
        }
    }
}
