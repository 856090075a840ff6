use std::fmt;

use sha2::{Digest, Sha256};

use crate::models::ApiVersion;

/// Lowercase hex SHA-256 of a document's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cache key of the form `{version}_{sha256hex}`, so each API version keeps
/// its own entry for the same document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(version: ApiVersion, hash: &ContentHash) -> Self {
        Self(format!("{}_{}", version.namespace(), hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn calculate_hash(content: &[u8]) -> ContentHash {
    tracing::debug!(size = content.len(), "Calculating hash of file");
    ContentHash(hex::encode(Sha256::digest(content)))
}
