use crate::games::{
    digimon::DigimonDeck,
    magic::{MagicDeck, MagicSet},
    pokemon::{PokemonDeck, PokemonSet},
    riftbound::RiftboundDeck,
    yugioh::YgoDeck,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    Magic,
    Yugioh,
    Pokemon,
    Digimon,
    Riftbound,
}

impl Game {
    pub const ALL: [Game; 5] = [
        Game::Magic,
        Game::Yugioh,
        Game::Pokemon,
        Game::Digimon,
        Game::Riftbound,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Magic => "magic",
            Self::Yugioh => "yugioh",
            Self::Pokemon => "pokemon",
            Self::Digimon => "digimon",
            Self::Riftbound => "riftbound",
        }
    }

    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|g| g.as_str() == s)
    }
}

impl Display for Game {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tournament fields every deck payload carries, whatever the game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckFields {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<u32>,
    #[serde(default, alias = "eventDate", skip_serializing_if = "Option::is_none")]
    pub event_date: Option<NaiveDate>,
}

/// Payload for list-like collections (cubes, binders, curated lists).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "inner")]
#[non_exhaustive]
pub enum CollectionType {
    MagicDeck(MagicDeck),
    MagicSet(MagicSet),
    MagicCube(ListInfo),
    #[serde(rename = "YGODeck")]
    YgoDeck(YgoDeck),
    #[serde(rename = "YGOCollection")]
    YgoCollection(ListInfo),
    PokemonDeck(PokemonDeck),
    PokemonSet(PokemonSet),
    PokemonBinder(ListInfo),
    DigimonDeck(DigimonDeck),
    RiftboundDeck(RiftboundDeck),
}

impl CollectionType {
    pub const TAGS: [&'static str; 10] = [
        "MagicDeck",
        "MagicSet",
        "MagicCube",
        "YGODeck",
        "YGOCollection",
        "PokemonDeck",
        "PokemonSet",
        "PokemonBinder",
        "DigimonDeck",
        "RiftboundDeck",
    ];

    /// Empty payload for `tag`, or `None` when the tag is unknown.
    #[must_use]
    pub fn zero(tag: &str) -> Option<Self> {
        let value = match tag {
            "MagicDeck" => Self::MagicDeck(MagicDeck::default()),
            "MagicSet" => Self::MagicSet(MagicSet::default()),
            "MagicCube" => Self::MagicCube(ListInfo::default()),
            "YGODeck" => Self::YgoDeck(YgoDeck::default()),
            "YGOCollection" => Self::YgoCollection(ListInfo::default()),
            "PokemonDeck" => Self::PokemonDeck(PokemonDeck::default()),
            "PokemonSet" => Self::PokemonSet(PokemonSet::default()),
            "PokemonBinder" => Self::PokemonBinder(ListInfo::default()),
            "DigimonDeck" => Self::DigimonDeck(DigimonDeck::default()),
            "RiftboundDeck" => Self::RiftboundDeck(RiftboundDeck::default()),
            _ => return None,
        };
        Some(value)
    }

    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::MagicDeck(_) => "MagicDeck",
            Self::MagicSet(_) => "MagicSet",
            Self::MagicCube(_) => "MagicCube",
            Self::YgoDeck(_) => "YGODeck",
            Self::YgoCollection(_) => "YGOCollection",
            Self::PokemonDeck(_) => "PokemonDeck",
            Self::PokemonSet(_) => "PokemonSet",
            Self::PokemonBinder(_) => "PokemonBinder",
            Self::DigimonDeck(_) => "DigimonDeck",
            Self::RiftboundDeck(_) => "RiftboundDeck",
        }
    }

    #[must_use]
    pub const fn game(&self) -> Game {
        match self {
            Self::MagicDeck(_) | Self::MagicSet(_) | Self::MagicCube(_) => Game::Magic,
            Self::YgoDeck(_) | Self::YgoCollection(_) => Game::Yugioh,
            Self::PokemonDeck(_) | Self::PokemonSet(_) | Self::PokemonBinder(_) => Game::Pokemon,
            Self::DigimonDeck(_) => Game::Digimon,
            Self::RiftboundDeck(_) => Game::Riftbound,
        }
    }

    #[must_use]
    pub fn deck_fields(&self) -> Option<&DeckFields> {
        match self {
            Self::MagicDeck(d) => Some(&d.deck),
            Self::YgoDeck(d) => Some(&d.deck),
            Self::PokemonDeck(d) => Some(&d.deck),
            Self::DigimonDeck(d) => Some(&d.deck),
            Self::RiftboundDeck(d) => Some(&d.deck),
            Self::MagicSet(_)
            | Self::MagicCube(_)
            | Self::YgoCollection(_)
            | Self::PokemonSet(_)
            | Self::PokemonBinder(_) => None,
        }
    }

    #[must_use]
    pub fn is_deck(&self) -> bool {
        self.deck_fields().is_some()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::MagicSet(s) => &s.name,
            Self::PokemonSet(s) => &s.name,
            Self::MagicCube(l) | Self::YgoCollection(l) | Self::PokemonBinder(l) => &l.name,
            deck => deck.deck_fields().map_or("", |d| d.name.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_report_their_own_tag() {
        for tag in CollectionType::TAGS {
            let value = CollectionType::zero(tag).expect("known tag");
            assert_eq!(value.tag(), tag);
        }
        assert!(CollectionType::zero("MagicDeckV2").is_none());
    }

    #[test]
    fn adjacent_tag_wire_shape() {
        let value = CollectionType::YgoDeck(YgoDeck::default());
        let json = serde_json::to_value(&value).expect("serialize");
        assert_eq!(json["type"], "YGODeck");
        assert!(json["inner"].is_object());
    }

    #[test]
    fn event_date_accepts_camel_case_alias() {
        let raw = r#"{"type":"PokemonDeck","inner":{"name":"Lost Box","eventDate":"2024-03-02","placement":4}}"#;
        let value: CollectionType = serde_json::from_str(raw).expect("decode");
        let deck = value.deck_fields().expect("deck");
        assert_eq!(deck.placement, Some(4));
        assert_eq!(
            deck.event_date,
            NaiveDate::from_ymd_opt(2024, 3, 2)
        );
    }

    #[test]
    fn game_parse_is_case_insensitive() {
        assert_eq!(Game::parse(" Magic "), Some(Game::Magic));
        assert_eq!(Game::parse("ygo"), None);
    }
}
