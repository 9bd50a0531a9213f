// SPDX-License-Identifier: Apache-2.0

use crate::backend::{BlobMeta, BlobStore, ListPage};
use crate::error::{StoreError, StoreErrorCode};
use crate::key::{validate_key, validate_prefix};
use crate::retry::{BackoffPolicy, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, LAST_MODIFIED};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;
use tracing::{instrument, warn};

/// Path-style S3-compatible object store at `{endpoint}/{bucket}`.
///
/// Objects are written with a single PUT, which S3 applies atomically.
/// Listing uses ListObjectsV2 with `start-after`, so keys come back in
/// byte order.
pub struct S3LikeStore {
    base_url: String,
    auth_bearer: Option<String>,
    retry: RetryPolicy,
    client: reqwest::Client,
    key_re: Regex,
    truncated_re: Regex,
}

impl S3LikeStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self, StoreError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| {
            StoreError::new(
                StoreErrorCode::Validation,
                format!("invalid store url {base_url}: {e}"),
            )
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let key_re = Regex::new(r"<Key>([^<]*)</Key>")
            .map_err(|e| StoreError::new(StoreErrorCode::Internal, e.to_string()))?;
        let truncated_re = Regex::new(r"<IsTruncated>\s*true\s*</IsTruncated>")
            .map_err(|e| StoreError::new(StoreErrorCode::Internal, e.to_string()))?;
        Ok(Self {
            base_url,
            auth_bearer: None,
            retry: RetryPolicy::default(),
            client,
            key_re,
            truncated_re,
        })
    }

    #[must_use]
    pub fn with_auth_bearer(mut self, token: impl Into<String>) -> Self {
        self.auth_bearer = Some(token.into()).filter(|t: &String| !t.is_empty());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn object_url(&self, key: &str) -> Result<Url, StoreError> {
        validate_key(key)?;
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| StoreError::new(StoreErrorCode::Validation, e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| {
                StoreError::new(StoreErrorCode::Validation, "store url cannot be a base")
            })?
            .pop_if_empty()
            .extend(key.split('/'));
        Ok(url)
    }

    fn auth_headers(&self) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.auth_bearer {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
                StoreError::new(StoreErrorCode::Validation, format!("invalid auth header: {e}"))
            })?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Sends the request built by `build`, retrying network failures, 429
    /// and 5xx. Any other status is returned to the caller.
    #[instrument(name = "store_s3_send_with_retry", skip(self, build))]
    async fn send_with_retry(
        &self,
        op: &str,
        build: impl Fn() -> RequestBuilder + Send + Sync,
    ) -> Result<Response, StoreError> {
        let headers = self.auth_headers()?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match build().headers(headers.clone()).send().await {
                Ok(resp) if !is_retryable_status(resp.status()) => return Ok(resp),
                Ok(resp) => {
                    if !self.retry.allows_another(attempt) {
                        return Err(StoreError::new(
                            StoreErrorCode::Network,
                            format!("{op} failed after {attempt} attempts: status={}", resp.status()),
                        ));
                    }
                    warn!(op, attempt, status = %resp.status(), "retrying s3 request");
                }
                Err(e) => {
                    if !self.retry.allows_another(attempt) {
                        return Err(StoreError::new(
                            StoreErrorCode::Network,
                            format!("{op} failed after {attempt} attempts: {e}"),
                        ));
                    }
                    warn!(op, attempt, error = %e, "retrying s3 request");
                }
            }
            tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
        }
    }

    fn parse_listing(&self, body: &str) -> ListPage {
        ListPage {
            keys: self
                .key_re
                .captures_iter(body)
                .map(|c| xml_unescape(&c[1]))
                .collect(),
            truncated: self.truncated_re.is_match(body),
        }
    }
}

#[async_trait]
impl BlobStore for S3LikeStore {
    fn backend_tag(&self) -> &'static str {
        "s3"
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.object_url(key)?;
        let resp = self
            .send_with_retry("get", || self.client.get(url.clone()))
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Err(StoreError::not_found(key)),
            status if status.is_success() => resp
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| StoreError::new(StoreErrorCode::Network, format!("read body failed: {e}"))),
            status => Err(unexpected_status("get", key, status)),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let url = self.object_url(key)?;
        let body = bytes.to_vec();
        let resp = self
            .send_with_retry("put", || self.client.put(url.clone()).body(body.clone()))
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(unexpected_status("put", key, resp.status()))
        }
    }

    async fn stat(&self, key: &str) -> Result<Option<BlobMeta>, StoreError> {
        let url = self.object_url(key)?;
        let resp = self
            .send_with_retry("head", || self.client.head(url.clone()))
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let headers = resp.headers();
                let size = headers
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(0);
                let modified = headers
                    .get(LAST_MODIFIED)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
                    .map(|d| d.with_timezone(&Utc));
                Ok(Some(BlobMeta { size, modified }))
            }
            status => Err(unexpected_status("head", key, status)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let url = self.object_url(key)?;
        let resp = self
            .send_with_retry("delete", || self.client.delete(url.clone()))
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(unexpected_status("delete", key, status)),
        }
    }

    async fn list_page(
        &self,
        prefix: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<ListPage, StoreError> {
        validate_prefix(prefix)?;
        let url = format!("{}/", self.base_url);
        let max_keys = limit.max(1).to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("list-type", "2"),
            ("prefix", prefix),
            ("max-keys", max_keys.as_str()),
        ];
        if let Some(cursor) = start_after {
            query.push(("start-after", cursor));
        }
        let resp = self
            .send_with_retry("list", || self.client.get(&url).query(&query))
            .await?;
        if !resp.status().is_success() {
            return Err(unexpected_status("list", prefix, resp.status()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| StoreError::new(StoreErrorCode::Network, format!("read listing failed: {e}")))?;
        let mut page = self.parse_listing(&body);
        if page.keys.len() > limit {
            page.keys.truncate(limit);
            page.truncated = true;
        }
        Ok(page)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn unexpected_status(op: &str, key: &str, status: StatusCode) -> StoreError {
    let code = match status.as_u16() {
        400 | 403 | 405 => StoreErrorCode::Unsupported,
        409 | 412 => StoreErrorCode::Conflict,
        _ => StoreErrorCode::Network,
    };
    StoreError::new(code, format!("{op} {key} returned status={status}"))
}

fn xml_unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
