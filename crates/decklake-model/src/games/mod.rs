//! Per-game payloads carried inside [`crate::CollectionType`].

pub mod digimon;
pub mod magic;
pub mod pokemon;
pub mod riftbound;
pub mod yugioh;
