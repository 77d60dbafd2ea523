use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Path-keyed byte store.
///
/// All implementations must satisfy these invariants:
/// - `get` after a successful `put` returns exactly the bytes written.
/// - A missing path is reported as `Ok(None)` or `Ok(false)`, never as an error.
/// - `list` returns every stored path starting with `prefix`, sorted.
/// - Implementations are safe for concurrent use by many callers.
/// - All I/O errors are propagated, never silently ignored.
pub trait StorageBackend: Send + Sync {
    /// Write `data` at `path`, replacing any previous content.
    fn put(&self, path: &str, data: &[u8]) -> StoreResult<()>;

    /// Read the bytes at `path`.
    ///
    /// Returns `Ok(None)` if nothing is stored there.
    fn get(&self, path: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Delete the bytes at `path`. Returns `true` if something was removed.
    fn delete(&self, path: &str) -> StoreResult<bool>;

    /// List all stored paths that start with `prefix`.
    ///
    /// Pass `""` to list everything.
    fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Check whether a path holds data.
    ///
    /// Default implementation reads the path. Backends may override for
    /// better performance.
    fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.get(path)?.is_some())
    }

    /// Write several paths in order, stopping at the first failure.
    fn put_batch(&self, items: &[(String, Vec<u8>)]) -> StoreResult<()> {
        items.iter().try_for_each(|(path, data)| self.put(path, data))
    }

    /// Delete every path under `prefix`, returning the paths removed.
    fn delete_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut removed = Vec::new();
        for path in self.list(prefix)? {
            if self.delete(&path)? {
                removed.push(path);
            }
        }
        Ok(removed)
    }
}

/// JSON helpers available on every [`StorageBackend`], including trait objects.
pub trait BackendExt: StorageBackend {
    /// Read and deserialize a JSON document.
    fn get_json<T: DeserializeOwned>(&self, path: &str) -> StoreResult<Option<T>> {
        match self.get(path)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Serialization {
                    path: path.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Serialize a value as pretty JSON and write it.
    fn put_json<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> StoreResult<Vec<u8>> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Serialization {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        self.put(path, &bytes)?;
        Ok(bytes)
    }
}

impl<B: StorageBackend + ?Sized> BackendExt for B {}
