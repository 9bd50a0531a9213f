// SPDX-License-Identifier: Apache-2.0

use crate::error::IngestError;
use decklake_fetch::FetchOptions;
use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;

pub const DEFAULT_EXTRACT_PARALLEL: usize = 128;
pub const DEFAULT_ITER_PARALLEL: usize = 64;
pub const MAX_PARALLEL: usize = 1_024;

/// Sparse override for an extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOption {
    Parallel(usize),
    /// Stop picking up work once this many items succeeded. Zero is ignored.
    ItemLimit(usize),
    /// Re-parse items whose blob already exists, from cached pages.
    Reparse,
    /// Re-fetch every page, bypassing and overwriting the page cache.
    FetchReplaceAll,
    /// Serve pages from the cache only; uncached pages fail the item.
    SkipMissing,
    /// Skip listing and process only this URL. May be repeated.
    ItemOnlyUrl(String),
    ScrollStart(i64),
    /// Maximum number of listing pages. Zero is ignored.
    ScrollLimit(usize),
    /// Restrict sources that expose sections to those matching this name.
    SectionOnly(String),
}

/// Every extraction option with its default filled in.
#[derive(Debug, Default)]
pub struct ResolvedUpdateOptions {
    pub parallel: usize,
    pub item_limit: Option<usize>,
    pub reparse: bool,
    pub fetch_replace_all: bool,
    pub skip_missing: bool,
    pub item_only_urls: Vec<String>,
    pub scroll_start: usize,
    pub scroll_limit: Option<usize>,
    pub section_only: Vec<String>,
    section_patterns: RwLock<HashMap<String, Option<Regex>>>,
}

impl ResolvedUpdateOptions {
    /// Fails on a parallelism outside `1..=1024`, a negative scroll start or
    /// mutually exclusive cache flags.
    pub fn resolve(options: &[UpdateOption]) -> Result<Self, IngestError> {
        let mut resolved = Self {
            parallel: DEFAULT_EXTRACT_PARALLEL,
            ..Self::default()
        };
        for option in options {
            match option {
                UpdateOption::Parallel(n) => resolved.parallel = *n,
                UpdateOption::ItemLimit(n) if *n > 0 => resolved.item_limit = Some(*n),
                UpdateOption::ItemLimit(_) => {}
                UpdateOption::Reparse => resolved.reparse = true,
                UpdateOption::FetchReplaceAll => resolved.fetch_replace_all = true,
                UpdateOption::SkipMissing => resolved.skip_missing = true,
                UpdateOption::ItemOnlyUrl(url) => resolved.item_only_urls.push(url.clone()),
                UpdateOption::ScrollStart(start) => {
                    resolved.scroll_start = usize::try_from(*start).map_err(|_| {
                        IngestError::config(format!("start page must be non-negative: {start}"))
                    })?;
                }
                UpdateOption::ScrollLimit(n) if *n > 0 => resolved.scroll_limit = Some(*n),
                UpdateOption::ScrollLimit(_) => {}
                UpdateOption::SectionOnly(section) => resolved.section_only.push(section.clone()),
            }
        }
        if !(1..=MAX_PARALLEL).contains(&resolved.parallel) {
            return Err(IngestError::config(format!(
                "parallel must be within 1..={MAX_PARALLEL}, got {}",
                resolved.parallel
            )));
        }
        if resolved.fetch_replace_all && resolved.skip_missing {
            return Err(IngestError::config(
                "FetchReplaceAll and SkipMissing cannot be combined",
            ));
        }
        Ok(resolved)
    }

    /// Whether an existing blob may be overwritten.
    #[must_use]
    pub fn overwrite_existing(&self) -> bool {
        self.reparse || self.fetch_replace_all
    }

    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            replace: self.fetch_replace_all,
            cache_only: self.skip_missing,
        }
    }

    /// True when no section filter is set, or when `pattern` (a
    /// case-insensitive regex supplied by the scraper) matches one of the
    /// requested sections. An invalid pattern matches nothing.
    pub fn section(&self, pattern: &str) -> bool {
        if self.section_only.is_empty() {
            return true;
        }
        let cached = self
            .section_patterns
            .read()
            .ok()
            .and_then(|cache| cache.get(pattern).cloned());
        let re = match cached {
            Some(re) => re,
            None => {
                let compiled = Regex::new(&format!("(?i){pattern}")).ok();
                if let Ok(mut cache) = self.section_patterns.write() {
                    cache.insert(pattern.to_string(), compiled.clone());
                }
                compiled
            }
        };
        re.is_some_and(|re| self.section_only.iter().any(|s| re.is_match(s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterItemsOption {
    Parallel(usize),
    /// Deliver at most this many items. Zero is ignored.
    Limit(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedIterOptions {
    pub parallel: usize,
    pub limit: Option<usize>,
}

impl ResolvedIterOptions {
    pub fn resolve(options: &[IterItemsOption]) -> Result<Self, IngestError> {
        let mut resolved = Self {
            parallel: DEFAULT_ITER_PARALLEL,
            limit: None,
        };
        for option in options {
            match *option {
                IterItemsOption::Parallel(n) => resolved.parallel = n,
                IterItemsOption::Limit(n) => resolved.limit = (n > 0).then_some(n),
            }
        }
        if !(1..=MAX_PARALLEL).contains(&resolved.parallel) {
            return Err(IngestError::config(format!(
                "parallel must be within 1..={MAX_PARALLEL}, got {}",
                resolved.parallel
            )));
        }
        Ok(resolved)
    }
}

/// Returned by an item callback to keep going or end the replay early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterControl {
    Continue,
    Stop,
}
