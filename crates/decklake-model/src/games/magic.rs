use crate::DeckFields;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const PARTITION_MAIN: &str = "Main";
pub const PARTITION_SIDEBOARD: &str = "Sideboard";
pub const PARTITION_COMMANDER: &str = "Commander";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicDeck {
    #[serde(flatten)]
    pub deck: DeckFields,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commanders: Vec<String>,
    /// Color identity as single-letter symbols (`W`, `U`, `B`, `R`, `G`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub colors: Vec<String>,
}

/// A printed set. `cards` carries the per-card facts the set listing
/// exposes; card names match the ones in the set's partitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MagicSet {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, alias = "releasedAt", skip_serializing_if = "Option::is_none")]
    pub release: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cards: Vec<SetCard>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetCard {
    pub name: String,
    /// Converted mana cost; fractional for a handful of joke cards.
    #[serde(default)]
    pub cmc: f64,
    #[serde(default, alias = "typeLine", skip_serializing_if = "String::is_empty")]
    pub type_line: String,
}
