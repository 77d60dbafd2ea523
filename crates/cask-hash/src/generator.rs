use cask_types::CacheHash;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::algorithm::{ContentDigest, HashAlgorithm};
use crate::canonical::{canonical_json, extract_field};
use crate::error::{HashError, HashResult};

/// Default number of hex characters kept from a digest.
pub const DEFAULT_HASH_LENGTH: usize = 16;

/// Algorithm and truncation length for cache hashes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashConfig {
    pub algorithm: HashAlgorithm,
    pub length: usize,
}

impl HashConfig {
    /// Check that `length` fits the algorithm's digest.
    pub fn validate(&self) -> HashResult<()> {
        let max = self.algorithm.hex_len();
        if self.length == 0 || self.length > max {
            return Err(HashError::InvalidLength {
                algorithm: self.algorithm.to_string(),
                length: self.length,
                max,
            });
        }
        Ok(())
    }
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            length: DEFAULT_HASH_LENGTH,
        }
    }
}

/// Deterministic content hasher.
///
/// Every `from_*` method hashes to the same [`CacheHash`] for the same input
/// and configuration, across processes and platforms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HashGenerator {
    config: HashConfig,
}

impl HashGenerator {
    /// Create a generator, validating the configuration.
    pub fn new(config: HashConfig) -> HashResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HashConfig {
        &self.config
    }

    /// Hash raw bytes.
    pub fn from_bytes(&self, data: &[u8]) -> CacheHash {
        let mut digest = self.digest();
        digest.update(data);
        self.finish(digest)
    }

    /// Hash the UTF-8 bytes of a string.
    pub fn from_string(&self, data: &str) -> CacheHash {
        self.from_bytes(data.as_bytes())
    }

    /// Hash the canonical rendering of a JSON value.
    pub fn from_json(&self, value: &Value) -> CacheHash {
        self.from_string(&canonical_json(value))
    }

    /// Hash only the value found at a dot-separated field path.
    ///
    /// String fields hash as their text, so `{"id": "abc"}` hashed on `id`
    /// matches `from_string("abc")`. Other values hash canonically.
    pub fn from_json_field(&self, value: &Value, field_path: &str) -> HashResult<CacheHash> {
        let field = extract_field(value, field_path)?;
        Ok(match field {
            Value::String(s) => self.from_string(s),
            other => self.from_json(other),
        })
    }

    /// Hash a JSON object after dropping the named top-level fields.
    ///
    /// Non-object values are hashed unchanged.
    pub fn from_json_excluding(&self, value: &Value, exclude: &[&str]) -> CacheHash {
        match value {
            Value::Object(map) => {
                let mut filtered = map.clone();
                for field in exclude {
                    filtered.remove(*field);
                }
                self.from_json(&Value::Object(filtered))
            }
            other => self.from_json(other),
        }
    }

    /// Start an incremental digest with this generator's algorithm.
    pub fn digest(&self) -> ContentDigest {
        self.config.algorithm.digest()
    }

    /// Finish an incremental digest into a truncated hash.
    pub fn finish(&self, digest: ContentDigest) -> CacheHash {
        CacheHash::from_digest(&digest.finalize(), self.config.length)
    }

    /// Check that `data` hashes to `expected`.
    pub fn verify(&self, data: &[u8], expected: &CacheHash) -> bool {
        self.from_bytes(data) == *expected
    }
}
