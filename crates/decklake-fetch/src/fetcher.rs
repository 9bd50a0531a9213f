// SPDX-License-Identifier: Apache-2.0

use crate::cache::{page_key, CachedPage};
use crate::config::ConfigError;
use crate::error::{FetchError, FetchErrorKind};
use crate::policy::SourcePolicy;
use crate::rate_limiter::RateLimiter;
use crate::request::{FetchRequest, FetchResponse};
use crate::transport::{ReqwestTransport, Transport};
use chrono::Utc;
use decklake_store::{with_prefix, BackoffPolicy, BlobStore, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Cached pages live under `pages/{host}/` of a shared store.
pub const PAGE_CACHE_PREFIX: &str = "pages";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Ignore any cached page and overwrite it with a fresh fetch.
    pub replace: bool,
    /// Serve only from the page cache; never touch the network.
    pub cache_only: bool,
}

impl FetchOptions {
    #[must_use]
    pub fn replace() -> Self {
        Self {
            replace: true,
            cache_only: false,
        }
    }
}

pub struct Fetcher {
    policy: SourcePolicy,
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn BlobStore>>,
    sent: AtomicU64,
}

impl Fetcher {
    pub fn new(policy: SourcePolicy, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        let limiter = Arc::new(RateLimiter::new(policy.rate_limit)?);
        Ok(Self {
            policy,
            limiter,
            transport,
            cache: None,
            sent: AtomicU64::new(0),
        })
    }

    /// Uses reqwest with the policy's request timeout.
    pub fn with_default_transport(policy: SourcePolicy) -> Result<Self, ConfigError> {
        let transport = Arc::new(ReqwestTransport::new(policy.timeout));
        Self::new(policy, transport)
    }

    /// Stores every final response under [`page_key`] in `store`.
    #[must_use]
    pub fn with_cache(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.cache = Some(store);
        self
    }

    /// Caches pages under [`PAGE_CACHE_PREFIX`] of a store shared with
    /// collection blobs.
    pub fn with_page_cache_in(self, store: Arc<dyn BlobStore>) -> Result<Self, StoreError> {
        let scoped = with_prefix(store, PAGE_CACHE_PREFIX)?;
        Ok(self.with_cache(Arc::new(scoped)))
    }

    /// Shares one bucket between fetchers hitting the same origin.
    #[must_use]
    pub fn with_shared_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &SourcePolicy {
        &self.policy
    }

    #[must_use]
    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Network requests issued so far, retries included.
    #[must_use]
    pub fn requests_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Returns the page for `request`, from cache unless `options.replace`.
    ///
    /// A non-2xx final status is an error even when the page was cached.
    #[instrument(name = "fetch", skip(self, request), fields(source = %self.policy.source, url = %request.url))]
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        options: FetchOptions,
    ) -> Result<FetchResponse, FetchError> {
        let key = page_key(request);
        if !options.replace {
            if let Some(response) = self.read_cached(&key, request).await? {
                debug!(status = response.status, "page served from cache");
                return ensure_success(response, request, 0);
            }
        }
        if options.cache_only {
            return Err(FetchError::new(
                FetchErrorKind::NotCached,
                &request.url,
                "cache-only fetch and page not cached",
            ));
        }

        let (response, attempts) = self.fetch_with_retry(request).await?;
        if let Some(cache) = &self.cache {
            let page = CachedPage::from_response(request, &response);
            let bytes = serde_json::to_vec(&page)
                .map_err(|e| FetchError::new(FetchErrorKind::Cache, &request.url, e.to_string()))?;
            cache
                .write(&key, &bytes)
                .await
                .map_err(|e| FetchError::new(FetchErrorKind::Cache, &request.url, e.to_string()))?;
        }
        debug!(
            status = response.status,
            bytes = response.body.len(),
            attempts,
            "fetched page"
        );
        ensure_success(response, request, attempts)
    }

    async fn read_cached(
        &self,
        key: &str,
        request: &FetchRequest,
    ) -> Result<Option<FetchResponse>, FetchError> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        let bytes = match cache.read(key).await {
            Ok(bytes) => bytes,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => {
                return Err(FetchError::new(
                    FetchErrorKind::Cache,
                    &request.url,
                    err.to_string(),
                ))
            }
        };
        let page: CachedPage = serde_json::from_slice(&bytes).map_err(|e| {
            FetchError::new(FetchErrorKind::Cache, &request.url, format!("corrupt page {key}: {e}"))
        })?;
        page.into_response().map(Some).map_err(|e| {
            FetchError::new(FetchErrorKind::Cache, &request.url, format!("corrupt page {key}: {e}"))
        })
    }

    async fn fetch_with_retry(
        &self,
        request: &FetchRequest,
    ) -> Result<(FetchResponse, usize), FetchError> {
        let url = request.url.as_str();
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await;
            self.sent.fetch_add(1, Ordering::Relaxed);
            let failure = match self.transport.send(request).await {
                Ok(raw) if self.policy.is_soft_throttled(&raw.body) => FetchError::new(
                    FetchErrorKind::Throttled,
                    url,
                    "response body matched the source throttle pattern",
                ),
                Ok(raw) if raw.status == 429 || raw.status >= 500 => FetchError::new(
                    FetchErrorKind::Status(raw.status),
                    url,
                    "transient status",
                ),
                Ok(raw) => {
                    let response = FetchResponse {
                        status: raw.status,
                        headers: raw.headers,
                        body: raw.body,
                        fetched_at: Utc::now(),
                        from_cache: false,
                    };
                    return Ok((response, attempt));
                }
                Err(err) => FetchError::from_transport(url, err),
            };
            if !failure.is_retryable() || !self.policy.retry.allows_another(attempt) {
                return Err(failure.with_attempts(attempt));
            }
            let mut delay = self.policy.retry.delay_for_attempt(attempt);
            if failure.kind == FetchErrorKind::Throttled {
                delay += self.policy.throttle_pause;
            }
            warn!(
                attempt,
                kind = failure.kind.as_str(),
                delay_ms = delay.as_millis() as u64,
                "retrying fetch"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

fn ensure_success(
    response: FetchResponse,
    request: &FetchRequest,
    attempts: usize,
) -> Result<FetchResponse, FetchError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(FetchError::new(
            FetchErrorKind::Status(response.status),
            &request.url,
            "non-success status",
        )
        .with_attempts(attempts))
    }
}
