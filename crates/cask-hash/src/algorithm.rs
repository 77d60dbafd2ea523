use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::Digest;

use crate::error::HashError;

/// Digest algorithm backing a [`HashGenerator`](crate::HashGenerator).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha256,
    Sha384,
    Blake3,
}

impl HashAlgorithm {
    /// Length of the full digest in hex characters.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 | Self::Blake3 => 64,
            Self::Sha384 => 96,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Blake3 => "blake3",
        }
    }

    /// Start an incremental digest.
    pub fn digest(&self) -> ContentDigest {
        match self {
            Self::Md5 => ContentDigest::Md5(md5::Md5::new()),
            Self::Sha256 => ContentDigest::Sha256(sha2::Sha256::new()),
            Self::Sha384 => ContentDigest::Sha384(sha2::Sha384::new()),
            Self::Blake3 => ContentDigest::Blake3(Box::new(blake3::Hasher::new())),
        }
    }
}

impl Default for HashAlgorithm {
    fn default() -> Self {
        Self::Sha256
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "blake3" => Ok(Self::Blake3),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Incremental digest over one of the supported algorithms.
///
/// Used when the hashed material is assembled from several parts, such as
/// the sorted entries of a zip archive.
pub enum ContentDigest {
    Md5(md5::Md5),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Blake3(Box<blake3::Hasher>),
}

impl ContentDigest {
    /// Feed more bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Consume the digest and return the full raw output.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Md5(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha384(h) => h.finalize().to_vec(),
            Self::Blake3(h) => h.finalize().as_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Md5(_) => "md5",
            Self::Sha256(_) => "sha256",
            Self::Sha384(_) => "sha384",
            Self::Blake3(_) => "blake3",
        };
        f.debug_tuple("ContentDigest").field(&name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_of(alg: HashAlgorithm, data: &[u8]) -> String {
        let mut d = alg.digest();
        d.update(data);
        let out = d.finalize();
        out.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn known_vectors() {
        assert_eq!(
            hex_of(HashAlgorithm::Md5, b"hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            hex_of(HashAlgorithm::Sha256, b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn hex_len_matches_output() {
        for alg in [
            HashAlgorithm::Md5,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Blake3,
        ] {
            assert_eq!(hex_of(alg, b"x").len(), alg.hex_len(), "{alg}");
        }
    }

    #[test]
    fn incremental_equals_one_shot() {
        let mut d = HashAlgorithm::Sha384.digest();
        d.update(b"hel");
        d.update(b"lo");
        let split = d.finalize();
        let mut d = HashAlgorithm::Sha384.digest();
        d.update(b"hello");
        assert_eq!(split, d.finalize());
    }

    #[test]
    fn parse_algorithm() {
        assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert!(matches!(
            "crc32".parse::<HashAlgorithm>(),
            Err(HashError::UnknownAlgorithm(_))
        ));
    }
}
