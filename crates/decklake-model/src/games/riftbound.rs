use crate::DeckFields;
use serde::{Deserialize, Serialize};

pub const PARTITION_MAIN: &str = "Main Deck";
pub const PARTITION_RUNES: &str = "Rune Deck";
pub const PARTITION_BATTLEFIELDS: &str = "Battlefields";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiftboundDeck {
    #[serde(flatten)]
    pub deck: DeckFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,
}
