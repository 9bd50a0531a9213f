use crate::error::{StoreError, StoreErrorCode};

pub const JSON_SUFFIX: &str = ".json";
pub const ZSTD_SUFFIX: &str = ".json.zst";

/// Rejects keys that could escape a backend root or collide after
/// normalization: empty keys, absolute paths, empty or dot segments and
/// backslashes.
pub fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() {
        return Err(StoreError::new(StoreErrorCode::Validation, "empty blob key"));
    }
    if key.starts_with('/') || key.contains('\\') {
        return Err(StoreError::new(
            StoreErrorCode::Validation,
            format!("blob key must be a relative slash-separated path: {key}"),
        ));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StoreError::new(
                StoreErrorCode::Validation,
                format!("invalid segment in blob key: {key}"),
            ));
        }
    }
    Ok(())
}

/// A prefix is either empty or a valid key, optionally ending in `/`.
pub fn validate_prefix(prefix: &str) -> Result<(), StoreError> {
    match prefix.strip_suffix('/') {
        _ if prefix.is_empty() => Ok(()),
        Some(stem) => validate_key(stem),
        None => validate_key(prefix),
    }
}

/// `{game}/{source}/{id}.json[.zst]`, with path separators in `id` replaced.
#[must_use]
pub fn collection_key(game: &str, source: &str, id: &str, compressed: bool) -> String {
    let id: String = id
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let suffix = if compressed { ZSTD_SUFFIX } else { JSON_SUFFIX };
    format!("{game}/{source}/{id}{suffix}")
}
