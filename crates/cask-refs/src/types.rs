//! Reference records persisted alongside cache content.

use cask_types::{CacheHash, CacheId, ContentEncoding, DataType, Namespace, Strategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One store event recorded under a hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEntry {
    pub cache_id: CacheId,
    pub timestamp: DateTime<Utc>,
}

/// All cache ids stored under one content hash, oldest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashReference {
    pub cache_hash: CacheHash,
    pub cache_ids: Vec<HashEntry>,
    pub latest_id: CacheId,
    pub total_versions: u64,
}

impl HashReference {
    /// Create a reference for the first store of a hash.
    pub fn new(cache_hash: CacheHash, cache_id: CacheId, timestamp: DateTime<Utc>) -> Self {
        Self {
            cache_hash,
            cache_ids: vec![HashEntry {
                cache_id,
                timestamp,
            }],
            latest_id: cache_id,
            total_versions: 1,
        }
    }

    /// Record another store of the same hash.
    pub fn append(&mut self, cache_id: CacheId, timestamp: DateTime<Utc>) {
        self.cache_ids.push(HashEntry {
            cache_id,
            timestamp,
        });
        self.latest_id = cache_id;
        self.total_versions = self.cache_ids.len() as u64;
    }

    /// Cache ids from newest to oldest, without duplicates.
    pub fn ids_newest_first(&self) -> Vec<CacheId> {
        let mut seen = Vec::with_capacity(self.cache_ids.len() + 1);
        for id in std::iter::once(self.latest_id)
            .chain(self.cache_ids.iter().rev().map(|e| e.cache_id))
        {
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        seen
    }

    pub fn contains(&self, cache_id: &CacheId) -> bool {
        self.cache_ids.iter().any(|e| e.cache_id == *cache_id)
    }
}

/// Paths written for one entry, grouped by role.
///
/// Each group holds a file plus its `.config` and `.metadata` sidecars.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPaths {
    pub data: Vec<String>,
    pub by_hash: Vec<String>,
    pub by_id: Vec<String>,
}

impl EntryPaths {
    /// Every path, in delete order: data, by-hash, by-id.
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.data.iter().chain(&self.by_hash).chain(&self.by_id)
    }

    pub fn len(&self) -> usize {
        self.data.len() + self.by_hash.len() + self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything known about one cache id.
///
/// Written once at store time. The only later rewrite is an explicit
/// in-place update, which replaces the hash and its by-hash paths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdReference {
    pub cache_id: CacheId,
    pub cache_hash: CacheHash,
    pub namespace: Namespace,
    pub strategy: Strategy,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<ContentEncoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    pub file_id: String,
    pub all_paths: EntryPaths,
    pub content_paths: Vec<String>,
    pub data_folders: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Descriptive metadata kept in a content file's `.metadata` sidecar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub cache_id: CacheId,
    pub cache_hash: CacheHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    pub file_id: String,
    pub namespace: Namespace,
    pub strategy: Strategy,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<ContentEncoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_field_path: Option<String>,
    /// Retention hint in hours. Recorded only; nothing here evicts entries.
    pub ttl_hours: u32,
    pub stored_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash() -> CacheHash {
        CacheHash::new("e15b31f87df1896e").unwrap()
    }

    #[test]
    fn new_hash_reference_has_one_version() {
        let id = CacheId::new();
        let r = HashReference::new(hash(), id, Utc::now());
        assert_eq!(r.total_versions, 1);
        assert_eq!(r.latest_id, id);
        assert!(r.contains(&id));
    }

    #[test]
    fn append_moves_latest() {
        let a = CacheId::new();
        let b = CacheId::new();
        let mut r = HashReference::new(hash(), a, Utc::now());
        r.append(b, Utc::now());
        assert_eq!(r.latest_id, b);
        assert_eq!(r.total_versions, 2);
        assert_eq!(r.ids_newest_first(), vec![b, a]);
    }

    #[test]
    fn ids_newest_first_dedups() {
        let a = CacheId::new();
        let mut r = HashReference::new(hash(), a, Utc::now());
        r.append(a, Utc::now());
        assert_eq!(r.ids_newest_first(), vec![a]);
    }

    #[test]
    fn entry_paths_order_and_len() {
        let paths = EntryPaths {
            data: vec!["d".into()],
            by_hash: vec!["h".into()],
            by_id: vec!["i".into()],
        };
        let all: Vec<_> = paths.all().cloned().collect();
        assert_eq!(all, vec!["d", "h", "i"]);
        assert_eq!(paths.len(), 3);
        assert!(EntryPaths::default().is_empty());
    }

    #[test]
    fn hash_reference_json_shape() {
        let id = CacheId::new();
        let r = HashReference::new(hash(), id, Utc::now());
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["cache_hash"], "e15b31f87df1896e");
        assert_eq!(v["latest_id"], id.to_string());
        assert_eq!(v["cache_ids"].as_array().unwrap().len(), 1);
        let back: HashReference = serde_json::from_value(v).unwrap();
        assert_eq!(back, r);
    }
}
