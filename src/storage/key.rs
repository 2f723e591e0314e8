//! Key Policy
//!
//! Maps cache keys onto storage locations that are safe for file names and
//! for services with restricted key alphabets.

use std::borrow::Cow;

use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

/// Punctuation allowed verbatim in a location besides ASCII letters and digits.
const SAFE_PUNCTUATION: &[char] = &['~', '_', ',', '.', '-', '/'];

/// Delimiter that replaces `/` in verbatim locations.
pub const PATH_DELIMITER: char = ',';

/// Lowercase hex SHA-256 of `key`.
pub fn digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Returns true if `key` may be used verbatim.
///
/// Leading dots are excluded so that no entry is mistaken for a hidden file.
fn is_plain(key: &str) -> bool {
    !key.starts_with('.')
        && !key.contains("..")
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || SAFE_PUNCTUATION.contains(&c))
}

// == Location ==
/// Maps `key` to a single path component.
///
/// Plain keys are kept readable with `/` rewritten to `,`; any other key is
/// replaced by its digest. Empty keys are rejected.
pub fn location(key: &str) -> Result<Cow<'_, str>> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }

    if !is_plain(key) {
        return Ok(Cow::Owned(digest(key)));
    }

    if key.contains('/') {
        Ok(Cow::Owned(key.replace('/', &PATH_DELIMITER.to_string())))
    } else {
        Ok(Cow::Borrowed(key))
    }
}
