use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{StoreError, StoreResult};
use crate::path::validate_path;
use crate::traits::StorageBackend;

/// In-memory, `BTreeMap`-based storage backend.
///
/// Intended for tests and embedding. Data lives behind a `RwLock` for safe
/// concurrent access and is lost when the backend is dropped. The ordered map
/// makes prefix listing a range scan.
pub struct InMemoryBackend {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
        }
    }

    fn read_map(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.files
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write_map(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.files
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    /// Number of paths currently stored.
    pub fn len(&self) -> usize {
        self.read_map().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if the backend is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes across all stored paths.
    pub fn total_bytes(&self) -> u64 {
        self.read_map()
            .map(|m| m.values().map(|v| v.len() as u64).sum())
            .unwrap_or(0)
    }

    /// Remove everything from the backend.
    pub fn clear(&self) -> StoreResult<()> {
        self.write_map()?.clear();
        Ok(())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for InMemoryBackend {
    fn put(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        validate_path(path)?;
        self.write_map()?.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.read_map()?.get(path).cloned())
    }

    fn delete(&self, path: &str) -> StoreResult<bool> {
        Ok(self.write_map()?.remove(path).is_some())
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let map = self.read_map()?;
        Ok(map
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.read_map()?.contains_key(path))
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("file_count", &self.len())
            .field("total_bytes", &self.total_bytes())
            .finish()
    }
}
