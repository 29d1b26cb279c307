//! Utility functions for key list processing.
//!
//! This module contains the key source helpers: parsing a line-delimited key
//! list into a deduplicated set, and splitting keys into path segments.

use crate::error::KeyCheckError;
use crate::types::KeySet;
use std::path::Path;

/// Split a key into its `/`-separated path segments.
///
/// Empty segments are preserved so the report shows exactly what the key
/// contains (`"a//b"` -> `["a", "", "b"]`).
pub fn split_key_segments(key: &str) -> Vec<&str> {
    key.split('/').collect()
}

/// Parse a line-delimited key list.
///
/// Each line is trimmed; blank lines are skipped and duplicates collapse.
/// Keys are otherwise opaque: no comment syntax is recognised.
pub fn parse_keys(content: &str) -> KeySet {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read a key list from a file.
///
/// # Errors
///
/// Returns `KeyCheckError::FileError` if the file does not exist or cannot
/// be read as UTF-8 text.
pub async fn read_keys_from_file<P: AsRef<Path>>(path: P) -> Result<KeySet, KeyCheckError> {
    let path = path.as_ref();

    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        KeyCheckError::file_error(
            path.to_string_lossy(),
            format!("Failed to read key list: {}", e),
        )
    })?;

    let keys = parse_keys(&content);
    tracing::debug!(path = %path.display(), keys = keys.len(), "loaded key list");
    Ok(keys)
}
