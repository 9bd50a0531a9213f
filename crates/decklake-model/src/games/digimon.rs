use crate::DeckFields;
use serde::{Deserialize, Serialize};

pub const PARTITION_MAIN: &str = "Main Deck";
pub const PARTITION_EGG: &str = "Digi-Egg Deck";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigimonDeck {
    #[serde(flatten)]
    pub deck: DeckFields,
}
