use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier assigned to a cache entry at store time (UUID v7).
///
/// Ids are time-ordered at millisecond resolution. An id never changes once
/// assigned, even when the entry's payload is later updated in place.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheId(uuid::Uuid);

impl CacheId {
    /// Generate a new time-ordered id.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Parse the hyphenated form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidCacheId(format!("{s:?}: {e}")))
    }

    /// Short representation (first 8 characters).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for CacheId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheId({})", self.short_id())
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CacheId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Longest accepted hash (a full SHA-512 hex digest).
const MAX_HASH_LEN: usize = 128;

/// Truncated, lowercase hex content hash.
///
/// Produced by the hash generator, or supplied explicitly by a caller that
/// wants to group entries under a semantic key. The same hash may be shared
/// by many cache ids.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheHash(String);

impl CacheHash {
    /// Validate and wrap a hex hash string.
    ///
    /// Uppercase input is normalized to lowercase.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into().to_ascii_lowercase();
        if value.is_empty() {
            return Err(TypeError::InvalidCacheHash {
                value,
                reason: "hash must not be empty".into(),
            });
        }
        if value.len() > MAX_HASH_LEN {
            return Err(TypeError::InvalidCacheHash {
                reason: format!("longer than {MAX_HASH_LEN} characters"),
                value,
            });
        }
        if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidCacheHash {
                value,
                reason: "must contain only hex digits".into(),
            });
        }
        Ok(Self(value))
    }

    /// Wrap raw digest bytes, hex-encoding and truncating to `length` chars.
    pub fn from_digest(digest: &[u8], length: usize) -> Self {
        let mut hex = hex::encode(digest);
        hex.truncate(length.max(1));
        Self(hex)
    }

    /// The hash as a hex string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of hex characters in the hash.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`: an empty hash cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CacheHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheHash({})", self.0)
    }
}

impl fmt::Display for CacheHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CacheHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CacheHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CacheHash> for String {
    fn from(hash: CacheHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for CacheHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
