//! Compression applied to stored blobs, chosen by key suffix.

use crate::error::{StoreError, StoreErrorCode};
use std::io::{Read, Write};

const ZSTD_LEVEL: i32 = 3;

#[must_use]
pub fn is_compressed_key(key: &str) -> bool {
    key.ends_with(".zst")
}

/// Compresses `bytes` when `key` names a `.zst` blob, otherwise copies them.
pub fn encode_for_key(key: &str, bytes: &[u8]) -> Result<Vec<u8>, StoreError> {
    if !is_compressed_key(key) {
        return Ok(bytes.to_vec());
    }
    let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), ZSTD_LEVEL)
        .map_err(|e| StoreError::new(StoreErrorCode::Internal, e.to_string()))?;
    encoder
        .write_all(bytes)
        .map_err(|e| StoreError::new(StoreErrorCode::Internal, e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| StoreError::new(StoreErrorCode::Internal, e.to_string()))
}

/// Inverse of [`encode_for_key`].
pub fn decode_for_key(key: &str, bytes: &[u8]) -> Result<Vec<u8>, StoreError> {
    if !is_compressed_key(key) {
        return Ok(bytes.to_vec());
    }
    let mut decoder = zstd::stream::read::Decoder::new(std::io::Cursor::new(bytes))
        .map_err(|e| StoreError::new(StoreErrorCode::Validation, e.to_string()))?;
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|e| {
        StoreError::new(
            StoreErrorCode::Validation,
            format!("corrupt zstd blob {key}: {e}"),
        )
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_and_plain_blobs_decode_to_same_bytes() {
        let json = br#"{"id":"1","partitions":[{"name":"Main","cards":[]}]}"#.repeat(20);
        let packed = encode_for_key("a/b/1.json.zst", &json).expect("encode");
        assert_ne!(packed, json);
        assert!(packed.len() < json.len());
        assert_eq!(decode_for_key("a/b/1.json.zst", &packed).expect("decode"), json);
        assert_eq!(decode_for_key("a/b/1.json", &json).expect("plain"), json);
    }

    #[test]
    fn garbage_under_zst_key_is_a_validation_error() {
        let err = decode_for_key("x.json.zst", b"not zstd").expect_err("corrupt");
        assert_eq!(err.code, StoreErrorCode::Validation);
    }
}
