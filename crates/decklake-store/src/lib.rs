// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Key/value blob storage shared by extraction, export and transform jobs.
//!
//! Every backend implements [`BlobStore`] with the same semantics: writes are
//! all-or-nothing per key, `exists` is a point-in-time check, and listing is
//! paginated so that [`BlobLister`] can walk millions of keys lazily and
//! resume from any key it has yielded.

mod backend;
pub mod codec;
mod config;
mod error;
mod key;
mod lister;
mod local;
mod memory;
mod prefixed;
mod retry;
mod s3;

pub const CRATE_NAME: &str = "decklake-store";

pub use backend::{BlobMeta, BlobStore, ListPage, ListingSession, DEFAULT_PAGE_SIZE};
pub use config::{open_store, StoreConfig};
pub use error::{StoreError, StoreErrorCode};
pub use key::{collection_key, validate_key, validate_prefix};
pub use lister::BlobLister;
pub use local::LocalFsStore;
pub use memory::MemoryStore;
pub use prefixed::{with_prefix, PrefixedStore};
pub use retry::{BackoffPolicy, RetryPolicy};
pub use s3::S3LikeStore;
