use crate::request::{FetchRequest, FetchResponse};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `{host}/{base64url(sha256(url.method.headers.body.))}.json`
///
/// Headers are hashed in sorted order so that header insertion order does
/// not split the cache.
#[must_use]
pub fn page_key(request: &FetchRequest) -> String {
    let mut headers: Vec<String> = request
        .headers
        .iter()
        .map(|(k, v)| format!("{}: {v}\r\n", k.to_ascii_lowercase()))
        .collect();
    headers.sort();

    let mut hasher = Sha256::new();
    hasher.update(request.url.as_bytes());
    hasher.update(b".");
    hasher.update(request.method.to_ascii_uppercase().as_bytes());
    hasher.update(b".");
    hasher.update(headers.concat().as_bytes());
    hasher.update(b".");
    hasher.update(request.body.as_deref().unwrap_or("").as_bytes());
    hasher.update(b".");
    let digest = URL_SAFE_NO_PAD.encode(hasher.finalize());
    let host = request.host().unwrap_or_else(|| "_invalid".to_string());
    format!("{host}/{digest}.json")
}

/// Stored form of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedPage {
    pub scraped_at: DateTime<Utc>,
    pub request: FetchRequest,
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    pub body_base64: String,
}

impl CachedPage {
    #[must_use]
    pub fn from_response(request: &FetchRequest, response: &FetchResponse) -> Self {
        Self {
            scraped_at: response.fetched_at,
            request: request.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body_base64: STANDARD.encode(&response.body),
        }
    }

    pub fn into_response(self) -> Result<FetchResponse, base64::DecodeError> {
        Ok(FetchResponse {
            status: self.status,
            headers: self.headers,
            body: STANDARD.decode(self.body_base64.as_bytes())?,
            fetched_at: self.scraped_at,
            from_cache: true,
        })
    }
}
