use crate::DeckFields;
use serde::{Deserialize, Serialize};

pub const PARTITION_MAIN: &str = "Main Deck";
pub const PARTITION_EXTRA: &str = "Extra Deck";
pub const PARTITION_SIDE: &str = "Side Deck";

/// Deck payload with the tournament metadata YGO event listings expose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YgoDeck {
    #[serde(flatten)]
    pub deck: DeckFields,
    #[serde(default, alias = "tournamentType", skip_serializing_if = "Option::is_none")]
    pub tournament_type: Option<String>,
    #[serde(default, alias = "tournamentSize", skip_serializing_if = "Option::is_none")]
    pub tournament_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, alias = "topCutSize", skip_serializing_if = "Option::is_none")]
    pub top_cut_size: Option<u32>,
}
