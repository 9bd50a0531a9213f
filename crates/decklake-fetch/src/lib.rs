// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! Rate-limited HTTP fetching with soft-throttle detection and a page cache.
//!
//! One [`Fetcher`] serves one source. Its [`SourcePolicy`] carries the token
//! bucket rate, the body pattern that marks a soft throttle, and the retry
//! budget; nothing is shared between sources unless the caller shares it.

mod cache;
mod config;
mod error;
mod fetcher;
mod policy;
mod rate_limiter;
mod request;
mod transport;

pub const CRATE_NAME: &str = "decklake-fetch";

pub use cache::{page_key, CachedPage};
pub use config::{env_bool, env_duration_ms, env_u64, env_usize, ConfigError};
pub use error::{FetchError, FetchErrorKind};
pub use fetcher::{FetchOptions, Fetcher, PAGE_CACHE_PREFIX};
pub use policy::{SourcePolicy, DEFAULT_THROTTLE_PATTERN};
pub use rate_limiter::{parse_rate_limit, RateLimitConfig, RateLimiter};
pub use request::{FetchRequest, FetchResponse};
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportError};
