use crate::canonical::{self, CanonicalReport, CanonicalizeError};
use crate::error::ModelError;
use crate::kind::{CollectionType, Game};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDesc {
    pub name: String,
    pub count: u32,
}

impl CardDesc {
    #[must_use]
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    #[serde(default)]
    pub cards: Vec<CardDesc>,
}

impl Partition {
    #[must_use]
    pub fn new(name: impl Into<String>, cards: Vec<CardDesc>) -> Self {
        Self {
            name: name.into(),
            cards,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub source: String,
    #[serde(alias = "date")]
    pub release_date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: CollectionType,
    #[serde(default)]
    pub partitions: Vec<Partition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Collection {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        source: impl Into<String>,
        release_date: DateTime<Utc>,
        kind: CollectionType,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            source: source.into(),
            release_date,
            kind,
            partitions: Vec::new(),
            scraped_at: None,
            updated_at: None,
            version: None,
        }
    }

    #[must_use]
    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partitions.push(partition);
        self
    }

    #[must_use]
    pub fn game(&self) -> Game {
        self.kind.game()
    }

    /// Sum of card counts across every partition.
    #[must_use]
    pub fn card_total(&self) -> u64 {
        self.partitions
            .iter()
            .flat_map(|p| p.cards.iter())
            .map(|c| u64::from(c.count))
            .sum()
    }

    /// Validates and normalizes the collection in place.
    ///
    /// On error the collection is left untouched. Every rewrite performed on
    /// success is counted in the returned report.
    pub fn canonicalize(&mut self) -> Result<CanonicalReport, CanonicalizeError> {
        canonical::canonicalize(self)
    }

    /// Content hash over sorted `partition:card:count` entries.
    ///
    /// Two collections with the same cards in the same partitions share a
    /// signature regardless of source, id or card order.
    #[must_use]
    pub fn deck_signature(&self) -> String {
        let mut parts: Vec<String> = self
            .partitions
            .iter()
            .map(|p| {
                let mut cards: Vec<String> = p
                    .cards
                    .iter()
                    .map(|c| format!("{}:{}", c.name, c.count))
                    .collect();
                cards.sort();
                format!("{}:{}", p.name, cards.join(","))
            })
            .collect();
        parts.sort();
        let mut hasher = Sha256::new();
        hasher.update(parts.join("|").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ModelError> {
        serde_json::to_vec(self).map_err(|e| ModelError::Encode(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ModelError> {
        serde_json::from_slice(bytes).map_err(|e| ModelError::Decode(e.to_string()))
    }
}
