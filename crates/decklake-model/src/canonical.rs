// SPDX-License-Identifier: Apache-2.0

use crate::collection::{CardDesc, Collection, Partition};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalizeError {
    EmptyId,
    EmptyUrl,
    InvalidUrl(String),
    BlankCardName { partition: String, index: usize },
    NoCards,
}

impl CanonicalizeError {
    /// Stable reason code, suitable for grouping failures in run statistics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::EmptyId => "empty_id",
            Self::EmptyUrl => "empty_url",
            Self::InvalidUrl(_) => "invalid_url",
            Self::BlankCardName { .. } => "blank_card_name",
            Self::NoCards => "no_cards",
        }
    }
}

impl Display for CanonicalizeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => f.write_str("empty id"),
            Self::EmptyUrl => f.write_str("url is empty"),
            Self::InvalidUrl(url) => write!(f, "failed to parse url: {url}"),
            Self::BlankCardName { partition, index } => {
                write!(f, "bad card name in partition {partition:?} at position {index}")
            }
            Self::NoCards => f.write_str("collection has no card with a positive count"),
        }
    }
}

impl std::error::Error for CanonicalizeError {}

/// Rewrites applied by a successful canonicalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanonicalReport {
    pub names_trimmed: usize,
    pub zero_counts_dropped: usize,
    pub duplicates_merged: usize,
    pub empty_partitions_dropped: usize,
}

impl CanonicalReport {
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        *self == Self::default()
    }
}

pub(crate) fn canonicalize(c: &mut Collection) -> Result<CanonicalReport, CanonicalizeError> {
    let mut report = CanonicalReport::default();

    let id = c.id.trim();
    if id.is_empty() {
        return Err(CanonicalizeError::EmptyId);
    }
    let url = c.url.trim();
    if url.is_empty() {
        return Err(CanonicalizeError::EmptyUrl);
    }
    if !looks_like_url(url) {
        return Err(CanonicalizeError::InvalidUrl(url.to_string()));
    }

    let mut partitions = Vec::with_capacity(c.partitions.len());
    for partition in &c.partitions {
        let name = trim_counted(&partition.name, &mut report);
        let mut cards: Vec<CardDesc> = Vec::with_capacity(partition.cards.len());
        for (index, card) in partition.cards.iter().enumerate() {
            if card.count == 0 {
                report.zero_counts_dropped += 1;
                continue;
            }
            let card_name = trim_counted(&card.name, &mut report);
            if card_name.is_empty() {
                return Err(CanonicalizeError::BlankCardName {
                    partition: name,
                    index,
                });
            }
            match cards.iter_mut().find(|c| c.name == card_name) {
                Some(existing) => {
                    existing.count = existing.count.saturating_add(card.count);
                    report.duplicates_merged += 1;
                }
                None => cards.push(CardDesc::new(card_name, card.count)),
            }
        }
        if cards.is_empty() {
            report.empty_partitions_dropped += 1;
            continue;
        }
        partitions.push(Partition { name, cards });
    }
    if partitions.is_empty() {
        return Err(CanonicalizeError::NoCards);
    }

    if id.len() != c.id.len() {
        report.names_trimmed += 1;
        c.id = id.to_string();
    }
    if url.len() != c.url.len() {
        c.url = url.to_string();
    }
    c.partitions = partitions;
    Ok(report)
}

fn trim_counted(raw: &str, report: &mut CanonicalReport) -> String {
    let trimmed = raw.trim();
    if trimmed.len() != raw.len() {
        report.names_trimmed += 1;
    }
    trimmed.to_string()
}

fn looks_like_url(url: &str) -> bool {
    let Some((scheme, rest)) = url.split_once("://") else {
        return false;
    };
    !scheme.is_empty()
        && scheme
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
        && rest
            .split(['/', '?', '#'])
            .next()
            .is_some_and(|host| !host.is_empty() && !host.contains(char::is_whitespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::yugioh::{YgoDeck, PARTITION_EXTRA, PARTITION_MAIN};
    use crate::CollectionType;
    use chrono::{TimeZone, Utc};

    fn collection(partitions: Vec<Partition>) -> Collection {
        let mut c = Collection::new(
            "deck-42",
            "https://ygoprodeck.test/deck/42",
            "ygoprodeck-tournament",
            Utc.with_ymd_and_hms(2024, 2, 3, 0, 0, 0).unwrap(),
            CollectionType::YgoDeck(YgoDeck::default()),
        );
        c.partitions = partitions;
        c
    }

    #[test]
    fn empty_partition_list_is_rejected() {
        let mut c = collection(vec![Partition::new(PARTITION_MAIN, vec![])]);
        let before = c.clone();
        let err = c.canonicalize().expect_err("no cards");
        assert_eq!(err, CanonicalizeError::NoCards);
        assert_eq!(err.reason(), "no_cards");
        assert_eq!(c, before, "failed canonicalization must not mutate");
    }

    #[test]
    fn zero_count_cards_are_dropped_and_reported() {
        let mut c = collection(vec![
            Partition::new(
                PARTITION_MAIN,
                vec![CardDesc::new("Ash Blossom", 3), CardDesc::new("Droll", 0)],
            ),
            Partition::new(PARTITION_EXTRA, vec![CardDesc::new("Accesscode", 0)]),
        ]);
        let report = c.canonicalize().expect("valid");
        assert_eq!(report.zero_counts_dropped, 2);
        assert_eq!(report.empty_partitions_dropped, 1);
        assert_eq!(c.partitions.len(), 1);
        assert_eq!(c.partitions[0].cards, vec![CardDesc::new("Ash Blossom", 3)]);
    }

    #[test]
    fn names_are_trimmed_and_duplicates_merged() {
        let mut c = collection(vec![Partition::new(
            " Main Deck ",
            vec![
                CardDesc::new(" Maxx \"C\"", 1),
                CardDesc::new("Maxx \"C\" ", 2),
            ],
        )]);
        let report = c.canonicalize().expect("valid");
        assert_eq!(report.duplicates_merged, 1);
        assert_eq!(report.names_trimmed, 3);
        assert_eq!(c.partitions[0].name, "Main Deck");
        assert_eq!(c.partitions[0].cards, vec![CardDesc::new("Maxx \"C\"", 3)]);
    }

    #[test]
    fn blank_card_name_identifies_position() {
        let mut c = collection(vec![Partition::new(
            PARTITION_MAIN,
            vec![CardDesc::new("Nibiru", 1), CardDesc::new("   ", 1)],
        )]);
        let err = c.canonicalize().expect_err("blank name");
        assert_eq!(
            err,
            CanonicalizeError::BlankCardName {
                partition: PARTITION_MAIN.to_string(),
                index: 1
            }
        );
    }

    #[test]
    fn provenance_is_checked_before_cards() {
        let mut c = collection(vec![Partition::new(PARTITION_MAIN, vec![CardDesc::new("A", 1)])]);
        c.id = "  ".to_string();
        assert_eq!(c.canonicalize(), Err(CanonicalizeError::EmptyId));

        let mut c = collection(vec![Partition::new(PARTITION_MAIN, vec![CardDesc::new("A", 1)])]);
        c.url = "not a url".to_string();
        assert!(matches!(c.canonicalize(), Err(CanonicalizeError::InvalidUrl(_))));

        c.url = String::new();
        assert_eq!(c.canonicalize(), Err(CanonicalizeError::EmptyUrl));
    }

    #[test]
    fn already_canonical_collection_reports_no_changes() {
        let mut c = collection(vec![Partition::new(
            PARTITION_MAIN,
            vec![CardDesc::new("A", 1), CardDesc::new("B", 2)],
        )]);
        let before = c.clone();
        assert!(c.canonicalize().expect("valid").is_unchanged());
        assert_eq!(c, before);
    }
}
