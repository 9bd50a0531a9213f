use crate::DeckFields;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const PARTITION_DECK: &str = "Deck";
pub const PARTITION_PRIZES: &str = "Prizes";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonDeck {
    #[serde(flatten)]
    pub deck: DeckFields,
    /// Age division for sanctioned play (Masters, Seniors, Juniors).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PokemonSet {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, alias = "releaseDate", skip_serializing_if = "Option::is_none")]
    pub release: Option<NaiveDate>,
}
