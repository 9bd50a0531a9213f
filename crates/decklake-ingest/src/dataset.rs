use crate::error::IngestError;
use crate::options::{IterControl, IterItemsOption, UpdateOption};
use crate::replay::IterSummary;
use crate::stats::RunSummary;
use async_trait::async_trait;
use decklake_fetch::Fetcher;
use decklake_model::{Collection, Game};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Game and source name; namespaces storage keys and statistics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Description {
    pub game: Game,
    pub name: String,
}

impl Description {
    #[must_use]
    pub fn new(game: Game, name: impl Into<String>) -> Self {
        Self {
            game,
            name: name.into(),
        }
    }

    /// `{game}/{name}/`, the listing prefix of every blob of this source.
    #[must_use]
    pub fn key_prefix(&self) -> String {
        format!("{}/{}/", self.game.as_str(), self.name)
    }
}

impl Display for Description {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.game, self.name)
    }
}

/// Run-scoped cancellation. Clones share the same signal.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    cancelled: Arc<AtomicBool>,
}

impl RunContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Workers finish the item in hand and pick up nothing new.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A collection replayed from the store, with the key it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredItem {
    pub key: String,
    pub collection: Collection,
}

/// Called once per replayed item, possibly from several tasks at once.
pub type ItemCallback =
    Arc<dyn Fn(StoredItem) -> Result<IterControl, IngestError> + Send + Sync>;

/// A per-source extraction job.
#[async_trait]
pub trait Dataset: Send + Sync {
    fn description(&self) -> Description;

    /// Scrapes the source and stores every parsed collection. Per-item
    /// failures are counted in the summary; only configuration errors fail
    /// the call.
    async fn extract(
        &self,
        ctx: &RunContext,
        fetcher: Arc<Fetcher>,
        options: &[UpdateOption],
    ) -> Result<RunSummary, IngestError>;

    /// Replays stored collections without fetching anything.
    async fn iter_items(
        &self,
        ctx: &RunContext,
        callback: ItemCallback,
        options: &[IterItemsOption],
    ) -> Result<IterSummary, IngestError>;
}
