use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The kind of payload held by an entry or child file.
///
/// The data type is recorded at store time and always read back from
/// metadata; it is never sniffed from content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Json,
    Binary,
}

impl DataType {
    /// File extension used for content of this type.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::String => "txt",
            Self::Json => "json",
            Self::Binary => "bin",
        }
    }

    /// Map a file extension back to a data type.
    ///
    /// Unknown extensions are treated as binary.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "txt" => Self::String,
            "json" => Self::Json,
            _ => Self::Binary,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Json => "json",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Ok(Self::String),
            "json" => Ok(Self::Json),
            "binary" | "bytes" => Ok(Self::Binary),
            _ => Err(TypeError::UnknownDataType(s.to_string())),
        }
    }
}

/// Path layout policy for an entry's content files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Content sharded by file id.
    Direct,
    /// Content bucketed by the UTC hour it was stored in.
    Temporal,
    /// Temporal bucket plus a `latest/` copy overwritten on each store.
    TemporalLatest,
    /// Temporal bucket, `latest/` copy, and a numbered `versions/` copy.
    TemporalVersioned,
    /// Content placed under a caller-supplied hierarchical key.
    KeyBased,
}

impl Strategy {
    /// All strategies, in declaration order.
    pub const ALL: [Strategy; 5] = [
        Self::Direct,
        Self::Temporal,
        Self::TemporalLatest,
        Self::TemporalVersioned,
        Self::KeyBased,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Temporal => "temporal",
            Self::TemporalLatest => "temporal_latest",
            Self::TemporalVersioned => "temporal_versioned",
            Self::KeyBased => "key_based",
        }
    }

    /// Directory under `data/` holding this strategy's content.
    pub fn folder(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Temporal => "temporal",
            Self::TemporalLatest => "temporal-latest",
            Self::TemporalVersioned => "temporal-versioned",
            Self::KeyBased => "key-based",
        }
    }

    /// Returns `true` for strategies whose paths embed a time bucket.
    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            Self::Temporal | Self::TemporalLatest | Self::TemporalVersioned
        )
    }

    /// Returns `true` if the strategy needs a caller-supplied cache key.
    pub fn requires_key(&self) -> bool {
        matches!(self, Self::KeyBased)
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Direct
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "direct" => Ok(Self::Direct),
            "temporal" => Ok(Self::Temporal),
            "temporal_latest" => Ok(Self::TemporalLatest),
            "temporal_versioned" => Ok(Self::TemporalVersioned),
            "key_based" | "semantic" | "semantic_file" => Ok(Self::KeyBased),
            _ => Err(TypeError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Encoding applied to the stored bytes of an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    Gzip,
}

impl ContentEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
        }
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentEncoding {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gzip" => Ok(Self::Gzip),
            _ => Err(TypeError::UnsupportedEncoding(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_extensions() {
        assert_eq!(DataType::String.extension(), "txt");
        assert_eq!(DataType::Json.extension(), "json");
        assert_eq!(DataType::Binary.extension(), "bin");
    }

    #[test]
    fn data_type_from_extension_defaults_to_binary() {
        assert_eq!(DataType::from_extension("txt"), DataType::String);
        assert_eq!(DataType::from_extension("json"), DataType::Json);
        assert_eq!(DataType::from_extension("png"), DataType::Binary);
    }

    #[test]
    fn data_type_parse() {
        assert_eq!("JSON".parse::<DataType>().unwrap(), DataType::Json);
        assert!("xml".parse::<DataType>().is_err());
    }

    #[test]
    fn data_type_serde_lowercase() {
        let json = serde_json::to_string(&DataType::Binary).unwrap();
        assert_eq!(json, "\"binary\"");
    }

    #[test]
    fn strategy_parse_accepts_aliases() {
        assert_eq!(
            "temporal-latest".parse::<Strategy>().unwrap(),
            Strategy::TemporalLatest
        );
        assert_eq!("semantic".parse::<Strategy>().unwrap(), Strategy::KeyBased);
        assert!("random".parse::<Strategy>().is_err());
    }

    #[test]
    fn strategy_roundtrips_through_as_str() {
        for s in Strategy::ALL {
            assert_eq!(s.as_str().parse::<Strategy>().unwrap(), s);
        }
    }

    #[test]
    fn strategy_folders_are_distinct() {
        let mut folders: Vec<_> = Strategy::ALL.iter().map(|s| s.folder()).collect();
        folders.sort();
        folders.dedup();
        assert_eq!(folders.len(), Strategy::ALL.len());
    }

    #[test]
    fn strategy_flags() {
        assert!(Strategy::TemporalVersioned.is_temporal());
        assert!(!Strategy::Direct.is_temporal());
        assert!(Strategy::KeyBased.requires_key());
        assert!(!Strategy::Temporal.requires_key());
    }

    #[test]
    fn content_encoding_parse() {
        assert_eq!("GZIP".parse::<ContentEncoding>().unwrap(), ContentEncoding::Gzip);
        assert_eq!(
            "br".parse::<ContentEncoding>(),
            Err(TypeError::UnsupportedEncoding("br".into()))
        );
    }
}
