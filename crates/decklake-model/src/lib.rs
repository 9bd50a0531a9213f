// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Canonical collection envelope shared by every source and game.
//!
//! A [`Collection`] is the unit persisted per scraped deck, set or cube. Its
//! `type` field is a closed [`CollectionType`] union whose wire form is
//! `{"type": <tag>, "inner": <payload>}`.

mod canonical;
mod collection;
mod error;
pub mod games;
mod kind;
mod registry;

pub const CRATE_NAME: &str = "decklake-model";

pub use canonical::{CanonicalReport, CanonicalizeError};
pub use collection::{CardDesc, Collection, Partition};
pub use error::ModelError;
pub use kind::{CollectionType, DeckFields, Game};
pub use registry::{builtin_registry, TypeConstructor, TypeRegistry};
