// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Card co-occurrence graph built from stored collections.

mod attributes;
mod cooccurrence;
mod csv;

pub const CRATE_NAME: &str = "decklake-transform";

pub use attributes::{AttributeTable, CardAttributes, ATTRIBUTES_HEADER};
pub use cooccurrence::{
    CollectionFilter, CooccurrenceTransform, EdgeCounts, TransformOptions, TransformSummary,
    EDGES_HEADER,
};
