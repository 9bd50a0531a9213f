use decklake_fetch::{ConfigError, FetchError, FetchErrorKind};
use decklake_model::{CanonicalizeError, ModelError};
use decklake_store::StoreError;
use std::fmt::{Display, Formatter};

/// Where in the pipeline an item failed. Per-item failures are counted per
/// category; only `Config` escapes a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCategory {
    Config,
    Fetch,
    Parse,
    Validation,
    Storage,
    Cancelled,
    Stopped,
}

impl ErrorCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Validation => "validation",
            Self::Storage => "storage",
            Self::Cancelled => "cancelled",
            Self::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestError {
    pub category: ErrorCategory,
    pub message: String,
}

impl IngestError {
    #[must_use]
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Config, message)
    }

    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Parse, message)
    }

    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Storage, message)
    }

    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorCategory::Cancelled, "run cancelled")
    }

    #[must_use]
    pub fn stopped() -> Self {
        Self::new(ErrorCategory::Stopped, "iteration stopped by callback")
    }
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.category.as_str(), self.message)
    }
}

impl std::error::Error for IngestError {}

impl From<FetchError> for IngestError {
    fn from(err: FetchError) -> Self {
        let category = match err.kind {
            FetchErrorKind::Cache => ErrorCategory::Storage,
            FetchErrorKind::InvalidRequest => ErrorCategory::Parse,
            _ => ErrorCategory::Fetch,
        };
        Self::new(category, err.to_string())
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<CanonicalizeError> for IngestError {
    fn from(err: CanonicalizeError) -> Self {
        Self::new(
            ErrorCategory::Validation,
            format!("{}: {err}", err.reason()),
        )
    }
}

impl From<ModelError> for IngestError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::DuplicateTag(_)
            | ModelError::TagMismatch { .. }
            | ModelError::UnregisteredTag(_) => Self::config(err.to_string()),
            _ => Self::parse(err.to_string()),
        }
    }
}

impl From<ConfigError> for IngestError {
    fn from(err: ConfigError) -> Self {
        Self::config(err.0)
    }
}
