use crate::backend::BlobStore;
use crate::error::{StoreError, StoreErrorCode};
use crate::local::LocalFsStore;
use crate::memory::MemoryStore;
use crate::prefixed::with_prefix;
use crate::retry::RetryPolicy;
use crate::s3::S3LikeStore;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

/// Where blobs live, parsed from a location string.
///
/// Accepted forms: `file:///abs/path` or a bare path, `mem://`, and
/// `s3://bucket[/prefix]?endpoint=http://host:port`. The bearer token for S3
/// comes from `DECKLAKE_STORE_BEARER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Local {
        root: PathBuf,
    },
    Memory,
    S3 {
        endpoint: String,
        bucket: String,
        prefix: String,
        auth_bearer: Option<String>,
    },
}

impl StoreConfig {
    pub fn from_url(location: &str) -> Result<Self, StoreError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(invalid("store location must not be empty"));
        }
        if location == "mem://" {
            return Ok(Self::Memory);
        }
        if let Some(path) = location.strip_prefix("file://") {
            if path.is_empty() {
                return Err(invalid("file:// location needs a path"));
            }
            return Ok(Self::Local {
                root: PathBuf::from(path),
            });
        }
        if let Some(rest) = location.strip_prefix("s3://") {
            let (target, query) = rest.split_once('?').unwrap_or((rest, ""));
            let (bucket, prefix) = target.split_once('/').unwrap_or((target, ""));
            if bucket.is_empty() {
                return Err(invalid("s3:// location needs a bucket"));
            }
            let endpoint = query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(k, _)| *k == "endpoint")
                .map(|(_, v)| v.trim_end_matches('/').to_string())
                .ok_or_else(|| invalid("s3:// location needs an endpoint= query parameter"))?;
            return Ok(Self::S3 {
                endpoint,
                bucket: bucket.to_string(),
                prefix: prefix.trim_matches('/').to_string(),
                auth_bearer: env::var("DECKLAKE_STORE_BEARER").ok().filter(|v| !v.is_empty()),
            });
        }
        if location.contains("://") {
            return Err(invalid(format!("unsupported store scheme: {location}")));
        }
        Ok(Self::Local {
            root: PathBuf::from(location),
        })
    }
}

/// Opens the backend described by `config`. Backend initialization errors are
/// returned, never deferred to the first read or write.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn BlobStore>, StoreError> {
    match config {
        StoreConfig::Local { root } => {
            std::fs::create_dir_all(root).map_err(|e| {
                StoreError::new(
                    StoreErrorCode::Io,
                    format!("cannot create store root {}: {e}", root.display()),
                )
            })?;
            Ok(Arc::new(LocalFsStore::new(root.clone())))
        }
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreConfig::S3 {
            endpoint,
            bucket,
            prefix,
            auth_bearer,
        } => {
            let mut store = S3LikeStore::new(format!("{endpoint}/{bucket}"))?
                .with_retry(RetryPolicy::default());
            if let Some(token) = auth_bearer {
                store = store.with_auth_bearer(token.clone());
            }
            let store: Arc<dyn BlobStore> = Arc::new(store);
            if prefix.is_empty() {
                Ok(store)
            } else {
                Ok(Arc::new(with_prefix(store, prefix)?))
            }
        }
    }
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::Validation, message)
}
