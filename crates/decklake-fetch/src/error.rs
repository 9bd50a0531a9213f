use crate::transport::TransportError;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FetchErrorKind {
    /// The body matched the source's soft-throttle pattern.
    Throttled,
    Status(u16),
    Timeout,
    Network,
    InvalidRequest,
    /// Cache-only fetch and the page has never been stored.
    NotCached,
    /// The page cache could not be read or written.
    Cache,
}

impl FetchErrorKind {
    #[must_use]
    pub fn is_retryable(self) -> bool {
        match self {
            Self::Throttled | Self::Timeout | Self::Network => true,
            Self::Status(status) => status == 429 || status >= 500,
            Self::InvalidRequest | Self::NotCached | Self::Cache => false,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Throttled => "throttled",
            Self::Status(_) => "status",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::InvalidRequest => "invalid_request",
            Self::NotCached => "not_cached",
            Self::Cache => "cache",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub url: String,
    pub attempts: usize,
    pub message: String,
}

impl FetchError {
    #[must_use]
    pub fn new(kind: FetchErrorKind, url: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.to_string(),
            attempts: 0,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    pub(crate) fn from_transport(url: &str, err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => Self::new(FetchErrorKind::Timeout, url, msg),
            TransportError::Network(msg) => Self::new(FetchErrorKind::Network, url, msg),
            TransportError::InvalidRequest(msg) => {
                Self::new(FetchErrorKind::InvalidRequest, url, msg)
            }
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            FetchErrorKind::Status(status) => write!(
                f,
                "fetch {} failed after {} attempt(s): status {status}: {}",
                self.url, self.attempts, self.message
            ),
            kind => write!(
                f,
                "fetch {} failed after {} attempt(s): {}: {}",
                self.url,
                self.attempts,
                kind.as_str(),
                self.message
            ),
        }
    }
}

impl std::error::Error for FetchError {}
