use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;
use crate::kind::DataType;

/// A typed value stored in, or read back from, the cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "data_type", content = "data", rename_all = "lowercase")]
pub enum Payload {
    String(String),
    Json(Value),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::String(_) => DataType::String,
            Self::Json(_) => DataType::Json,
            Self::Binary(_) => DataType::Binary,
        }
    }

    /// Serialize to the bytes written to storage.
    ///
    /// Strings are stored raw, JSON compactly, binary as-is.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TypeError> {
        match self {
            Self::String(s) => Ok(s.as_bytes().to_vec()),
            Self::Json(v) => serde_json::to_vec(v).map_err(|e| TypeError::Serialization(e.to_string())),
            Self::Binary(b) => Ok(b.clone()),
        }
    }

    /// Decode stored bytes according to a recorded data type.
    pub fn from_bytes(data_type: DataType, bytes: Vec<u8>) -> Result<Self, TypeError> {
        match data_type {
            DataType::String => String::from_utf8(bytes)
                .map(Self::String)
                .map_err(|e| TypeError::Serialization(format!("stored string is not UTF-8: {e}"))),
            DataType::Json => serde_json::from_slice(&bytes)
                .map(Self::Json)
                .map_err(|e| TypeError::Serialization(format!("stored JSON is invalid: {e}"))),
            DataType::Binary => Ok(Self::Binary(bytes)),
        }
    }

    /// Returns `true` for an empty string or empty byte buffer.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::Json(_) => false,
            Self::Binary(b) => b.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Value> for Payload {
    fn from(v: Value) -> Self {
        Self::Json(v)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_bytes_are_raw() {
        let p = Payload::from("hello");
        assert_eq!(p.to_bytes().unwrap(), b"hello");
        assert_eq!(p.data_type(), DataType::String);
    }

    #[test]
    fn json_bytes_are_compact() {
        let p = Payload::from(json!({"a": 1}));
        assert_eq!(p.to_bytes().unwrap(), br#"{"a":1}"#);
    }

    #[test]
    fn from_bytes_respects_type() {
        let s = Payload::from_bytes(DataType::String, b"hi".to_vec()).unwrap();
        assert_eq!(s.as_str(), Some("hi"));

        let j = Payload::from_bytes(DataType::Json, br#"[1,2]"#.to_vec()).unwrap();
        assert_eq!(j.as_json(), Some(&json!([1, 2])));

        let b = Payload::from_bytes(DataType::Binary, vec![0, 159]).unwrap();
        assert_eq!(b.as_bytes(), Some(&[0u8, 159][..]));
    }

    #[test]
    fn from_bytes_rejects_bad_utf8_and_json() {
        assert!(Payload::from_bytes(DataType::String, vec![0xff, 0xfe]).is_err());
        assert!(Payload::from_bytes(DataType::Json, b"{nope".to_vec()).is_err());
    }

    #[test]
    fn emptiness() {
        assert!(Payload::from("").is_empty());
        assert!(Payload::Binary(vec![]).is_empty());
        assert!(!Payload::Json(json!({})).is_empty());
    }
}
