use crate::csv::field;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Mutex;

pub const ATTRIBUTES_HEADER: &str = "NAME,CMC,TYPE_LINE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardAttributes {
    /// Converted mana cost, or the game's closest equivalent.
    pub cmc: f64,
    pub type_line: String,
}

/// Per-card attributes collected alongside the co-occurrence graph.
///
/// The first record for a name wins, so reprints seen later do not
/// overwrite it.
#[derive(Debug, Default)]
pub struct AttributeTable {
    cards: Mutex<BTreeMap<String, CardAttributes>>,
}

impl AttributeTable {
    pub fn record(&self, name: &str, attributes: CardAttributes) {
        if let Ok(mut cards) = self.cards.lock() {
            cards.entry(name.trim().to_string()).or_insert(attributes);
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<CardAttributes> {
        self.cards.lock().ok()?.get(name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.lock().map(|c| c.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `NAME,CMC,TYPE_LINE` rows sorted by name. Returns the row count.
    pub fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<usize> {
        let cards = self
            .cards
            .lock()
            .map_err(|_| io::Error::other("attribute table poisoned"))?;
        writeln!(out, "{ATTRIBUTES_HEADER}")?;
        for (name, attrs) in cards.iter() {
            writeln!(out, "{},{},{}", field(name), attrs.cmc, field(&attrs.type_line))?;
        }
        Ok(cards.len())
    }
}
