// SPDX-License-Identifier: Apache-2.0

use crate::config::{env_u64, env_usize, ConfigError};
use crate::rate_limiter::{parse_rate_limit, RateLimitConfig};
use decklake_store::RetryPolicy;
use regex::bytes::Regex;
use std::env;
use std::time::Duration;

/// Matches the block pages most sources serve with a 200 status.
pub const DEFAULT_THROTTLE_PATTERN: &str = r"(?i)(rate limit(ed)?|too many requests)";

/// Fetch behaviour for one source.
#[derive(Debug, Clone)]
pub struct SourcePolicy {
    pub source: String,
    pub rate_limit: Option<RateLimitConfig>,
    pub throttle_pattern: Option<Regex>,
    pub retry: RetryPolicy,
    /// Extra pause after a soft throttle, on top of the backoff delay.
    pub throttle_pause: Duration,
    pub timeout: Duration,
}

impl SourcePolicy {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            rate_limit: Some(RateLimitConfig::default()),
            throttle_pattern: None,
            retry: RetryPolicy {
                max_attempts: 7,
                base_backoff_ms: 1_000,
                max_backoff_ms: 240_000,
                jitter_ms: 1_000,
            },
            throttle_pause: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: Option<RateLimitConfig>) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_throttle_pattern(mut self, pattern: &str) -> Result<Self, ConfigError> {
        let re = Regex::new(pattern).map_err(|e| {
            ConfigError(format!(
                "invalid throttle pattern for {}: {e}",
                self.source
            ))
        })?;
        self.throttle_pattern = Some(re);
        Ok(self)
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_throttle_pause(mut self, pause: Duration) -> Self {
        self.throttle_pause = pause;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Applies `DECKLAKE_FETCH_*` overrides. A per-source rate limit
    /// (`DECKLAKE_FETCH_RATE_LIMIT_<SOURCE>`) wins over the global one.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        let per_source = format!("DECKLAKE_FETCH_RATE_LIMIT_{}", env_suffix(&self.source));
        let raw = env::var(&per_source)
            .ok()
            .or_else(|| env::var("DECKLAKE_FETCH_RATE_LIMIT").ok());
        if let Some(raw) = raw {
            self.rate_limit = parse_rate_limit(&raw)?;
        }
        self.timeout = Duration::from_millis(env_u64(
            "DECKLAKE_FETCH_TIMEOUT_MS",
            self.timeout.as_millis() as u64,
        ));
        self.retry.max_attempts = env_usize("DECKLAKE_FETCH_MAX_ATTEMPTS", self.retry.max_attempts);
        self.retry.base_backoff_ms =
            env_u64("DECKLAKE_FETCH_BASE_BACKOFF_MS", self.retry.base_backoff_ms);
        self.retry.max_backoff_ms =
            env_u64("DECKLAKE_FETCH_MAX_BACKOFF_MS", self.retry.max_backoff_ms);
        if self.retry.max_attempts == 0 {
            return Err(ConfigError(
                "DECKLAKE_FETCH_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }

    #[must_use]
    pub fn is_soft_throttled(&self, body: &[u8]) -> bool {
        self.throttle_pattern
            .as_ref()
            .is_some_and(|re| re.is_match(body))
    }
}

fn env_suffix(source: &str) -> String {
    source
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
