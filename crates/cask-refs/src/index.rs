//! Read-modify-write management of the hash and id reference records.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cask_store::{BackendExt, StorageBackend};
use cask_types::{CacheHash, CacheId};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{RefError, Result};
use crate::layout::{Layout, REFS_BY_HASH, REFS_BY_ID};
use crate::sidecar::{is_sidecar, sidecar_paths, write_file_set};
use crate::types::{HashReference, IdReference};

/// Outcome of releasing one id's claim on a HashReference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashRelease {
    /// No other live id carries the hash; the reference files were deleted.
    Removed {
        deleted: Vec<String>,
        failed: Vec<String>,
    },
    /// Other live ids still resolve through this hash; the record is kept.
    Retained { live_ids: usize },
    /// There was no reference for this hash.
    Missing,
}

/// Per-hash mutexes serializing updates to the same HashReference.
///
/// The lock is in-process only. Two processes sharing one disk root can
/// still interleave their read-modify-write cycles.
#[derive(Default)]
struct HashLocks {
    table: Mutex<HashMap<CacheHash, Arc<Mutex<()>>>>,
}

impl HashLocks {
    fn with_lock<T, E>(&self, hash: &CacheHash, f: impl FnOnce() -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<RefError>,
    {
        let lock = {
            let mut table = self
                .table
                .lock()
                .map_err(|e| RefError::LockPoisoned(e.to_string()))?;
            Arc::clone(table.entry(hash.clone()).or_default())
        };
        let result = {
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f()
        };
        if let Ok(mut table) = self.table.lock() {
            // Only the table and this call hold the lock: nobody is waiting.
            if Arc::strong_count(&lock) == 2 {
                table.remove(hash);
            }
        }
        result
    }
}

/// Hash and id reference indices for one namespace.
///
/// Reads never fail on absence: a missing record is `Ok(None)`.
pub struct RefIndex {
    backend: Arc<dyn StorageBackend>,
    layout: Layout,
    locks: HashLocks,
}

impl RefIndex {
    pub fn new(backend: Arc<dyn StorageBackend>, layout: Layout) -> Self {
        Self {
            backend,
            layout,
            locks: HashLocks::default(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Run `f` while holding the lock for `hash`.
    ///
    /// Not reentrant: `f` must not call [`upsert_hash_ref`](Self::upsert_hash_ref)
    /// or [`release_hash_ref`](Self::release_hash_ref) for the same hash.
    pub fn with_hash_lock<T, E>(&self, hash: &CacheHash, f: impl FnOnce() -> std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: From<RefError>,
    {
        self.locks.with_lock(hash, f)
    }

    // ---- HashReference ----

    /// Read the HashReference for `hash`.
    pub fn read_hash_ref(&self, hash: &CacheHash) -> Result<Option<HashReference>> {
        Ok(self.backend.get_json(&self.layout.hash_ref_path(hash))?)
    }

    /// Append `cache_id` to the HashReference for `hash`, creating it on the
    /// first store. Returns the updated record and the paths written.
    pub fn upsert_hash_ref(
        &self,
        hash: &CacheHash,
        cache_id: &CacheId,
        timestamp: DateTime<Utc>,
    ) -> Result<(HashReference, Vec<String>)> {
        self.with_hash_lock(hash, || {
            let reference = match self.read_hash_ref(hash)? {
                Some(mut existing) => {
                    existing.append(*cache_id, timestamp);
                    existing
                }
                None => HashReference::new(hash.clone(), *cache_id, timestamp),
            };
            let path = self.layout.hash_ref_path(hash);
            let written = self.write_record(&path, &reference, hash.as_str(), timestamp)?;
            debug!(
                cache_hash = %hash,
                cache_id = %cache_id,
                total_versions = reference.total_versions,
                "upserted hash reference"
            );
            Ok((reference, written))
        })
    }

    /// Drop `cache_id`'s claim on the HashReference for `hash`.
    ///
    /// The record is deleted (with its sidecars) only when no other id in its
    /// version list still has an IdReference carrying this hash. Otherwise
    /// the record is left untouched.
    pub fn release_hash_ref(&self, hash: &CacheHash, cache_id: &CacheId) -> Result<HashRelease> {
        self.with_hash_lock(hash, || {
            let Some(reference) = self.read_hash_ref(hash)? else {
                return Ok(HashRelease::Missing);
            };
            let mut live_ids = 0;
            for id in reference.ids_newest_first() {
                if id != *cache_id && self.id_carries_hash(&id, hash)? {
                    live_ids += 1;
                }
            }
            if live_ids > 0 {
                debug!(cache_hash = %hash, live_ids, "hash reference retained");
                return Ok(HashRelease::Retained { live_ids });
            }

            let mut deleted = Vec::new();
            let mut failed = Vec::new();
            for path in sidecar_paths(&self.layout.hash_ref_path(hash)) {
                match self.backend.delete(&path) {
                    Ok(true) => deleted.push(path),
                    Ok(false) => failed.push(path),
                    Err(e) => {
                        warn!(path = %path, error = %e, "failed to delete hash reference file");
                        failed.push(path);
                    }
                }
            }
            Ok(HashRelease::Removed { deleted, failed })
        })
    }

    /// Resolve a hash to the newest id that still carries it.
    ///
    /// Ids that were deleted, or updated to a different hash, are skipped.
    pub fn resolve_latest(&self, hash: &CacheHash) -> Result<Option<IdReference>> {
        let Some(reference) = self.read_hash_ref(hash)? else {
            return Ok(None);
        };
        for id in reference.ids_newest_first() {
            if let Some(id_ref) = self.read_id_ref(&id)? {
                if id_ref.cache_hash == *hash {
                    return Ok(Some(id_ref));
                }
            }
        }
        debug!(cache_hash = %hash, "hash reference has no live ids");
        Ok(None)
    }

    // ---- IdReference ----

    /// Write the IdReference for `reference.cache_id`. Returns the paths written.
    pub fn write_id_ref(&self, reference: &IdReference) -> Result<Vec<String>> {
        let path = self.layout.id_ref_path(&reference.cache_id);
        let written = self.write_record(
            &path,
            reference,
            &reference.cache_id.to_string(),
            reference.timestamp,
        )?;
        debug!(cache_id = %reference.cache_id, path = %path, "wrote id reference");
        Ok(written)
    }

    /// Read the IdReference for `id`.
    pub fn read_id_ref(&self, id: &CacheId) -> Result<Option<IdReference>> {
        Ok(self.backend.get_json(&self.layout.id_ref_path(id))?)
    }

    fn id_carries_hash(&self, id: &CacheId, hash: &CacheHash) -> Result<bool> {
        Ok(self
            .read_id_ref(id)?
            .is_some_and(|r| r.cache_hash == *hash))
    }

    // ---- Enumeration ----

    /// Every cache id with an IdReference, sorted.
    pub fn list_ids(&self) -> Result<Vec<CacheId>> {
        let mut ids: Vec<CacheId> = self
            .record_stems(REFS_BY_ID)?
            .into_iter()
            .filter_map(|stem| match CacheId::parse(&stem) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(file = %stem, error = %e, "skipping unparseable id reference");
                    None
                }
            })
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Every hash with a HashReference, sorted.
    pub fn list_hashes(&self) -> Result<Vec<CacheHash>> {
        let mut hashes: Vec<CacheHash> = self
            .record_stems(REFS_BY_HASH)?
            .into_iter()
            .filter_map(|stem| CacheHash::new(stem).ok())
            .collect();
        hashes.sort();
        Ok(hashes)
    }

    fn record_stems(&self, root: &str) -> Result<Vec<String>> {
        Ok(self
            .backend
            .list(&format!("{root}/"))?
            .into_iter()
            .filter(|p| !is_sidecar(p))
            .filter_map(|p| {
                let name = p.rsplit('/').next()?;
                name.strip_suffix(".json").map(str::to_string)
            })
            .collect())
    }

    fn write_record<T: serde::Serialize>(
        &self,
        path: &str,
        record: &T,
        file_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| cask_store::StoreError::Serialization {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(write_file_set(
            self.backend.as_ref(),
            path,
            &bytes,
            file_id,
            timestamp,
            None,
        )?)
    }
}

impl std::fmt::Debug for RefIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefIndex")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryPaths;
    use cask_store::InMemoryBackend;
    use cask_types::{DataType, Namespace, Strategy};

    fn index() -> (Arc<InMemoryBackend>, RefIndex) {
        let backend = Arc::new(InMemoryBackend::new());
        let index = RefIndex::new(backend.clone(), Layout::default());
        (backend, index)
    }

    fn hash(s: &str) -> CacheHash {
        CacheHash::new(s).unwrap()
    }

    fn id_ref(index: &RefIndex, id: CacheId, h: &CacheHash) -> IdReference {
        IdReference {
            cache_id: id,
            cache_hash: h.clone(),
            namespace: Namespace::default(),
            strategy: Strategy::Direct,
            data_type: DataType::String,
            content_encoding: None,
            cache_key: None,
            file_id: id.to_string(),
            all_paths: EntryPaths {
                by_hash: sidecar_paths(&index.layout().hash_ref_path(h)).to_vec(),
                by_id: sidecar_paths(&index.layout().id_ref_path(&id)).to_vec(),
                ..EntryPaths::default()
            },
            content_paths: vec![],
            data_folders: vec![],
            timestamp: Utc::now(),
        }
    }

    // -----------------------------------------------------------------------
    // HashReference upsert
    // -----------------------------------------------------------------------

    #[test]
    fn first_upsert_creates_reference_with_sidecars() {
        let (backend, index) = index();
        let h = hash("e15b31f87df1896e");
        let id = CacheId::new();
        let (reference, written) = index.upsert_hash_ref(&h, &id, Utc::now()).unwrap();
        assert_eq!(reference.total_versions, 1);
        assert_eq!(
            written,
            vec![
                "refs/by-hash/e1/5b/e15b31f87df1896e.json".to_string(),
                "refs/by-hash/e1/5b/e15b31f87df1896e.json.config".to_string(),
                "refs/by-hash/e1/5b/e15b31f87df1896e.json.metadata".to_string(),
            ]
        );
        assert_eq!(backend.len(), 3);
    }

    #[test]
    fn second_upsert_appends() {
        let (_backend, index) = index();
        let h = hash("abcd1234");
        let a = CacheId::new();
        let b = CacheId::new();
        index.upsert_hash_ref(&h, &a, Utc::now()).unwrap();
        let (reference, _) = index.upsert_hash_ref(&h, &b, Utc::now()).unwrap();
        assert_eq!(reference.total_versions, 2);
        assert_eq!(reference.latest_id, b);
        assert_eq!(index.read_hash_ref(&h).unwrap(), Some(reference));
    }

    #[test]
    fn read_missing_references() {
        let (_backend, index) = index();
        assert!(index.read_hash_ref(&hash("00")).unwrap().is_none());
        assert!(index.read_id_ref(&CacheId::new()).unwrap().is_none());
        assert!(index.resolve_latest(&hash("00")).unwrap().is_none());
    }

    #[test]
    fn concurrent_upserts_keep_every_id() {
        let (_backend, index) = index();
        let index = Arc::new(index);
        let h = hash("feedbeef");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let index = Arc::clone(&index);
                let h = h.clone();
                std::thread::spawn(move || {
                    let id = CacheId::new();
                    index.upsert_hash_ref(&h, &id, Utc::now()).unwrap();
                    id
                })
            })
            .collect();
        let ids: Vec<CacheId> = handles.into_iter().map(|t| t.join().unwrap()).collect();
        let reference = index.read_hash_ref(&h).unwrap().unwrap();
        assert_eq!(reference.total_versions, 8);
        for id in ids {
            assert!(reference.contains(&id));
        }
    }

    // -----------------------------------------------------------------------
    // IdReference and resolution
    // -----------------------------------------------------------------------

    #[test]
    fn id_reference_roundtrip() {
        let (_backend, index) = index();
        let h = hash("aa11");
        let id = CacheId::new();
        let r = id_ref(&index, id, &h);
        let written = index.write_id_ref(&r).unwrap();
        assert_eq!(written.len(), 3);
        assert_eq!(index.read_id_ref(&id).unwrap(), Some(r));
    }

    #[test]
    fn resolve_latest_skips_dead_and_rehashed_ids() {
        let (_backend, index) = index();
        let h = hash("bb22");
        let old = CacheId::new();
        let moved = CacheId::new();
        let gone = CacheId::new();
        for id in [old, moved, gone] {
            index.upsert_hash_ref(&h, &id, Utc::now()).unwrap();
        }
        index.write_id_ref(&id_ref(&index, old, &h)).unwrap();
        index.write_id_ref(&id_ref(&index, moved, &hash("cc33"))).unwrap();
        // `gone` has no IdReference at all.

        let resolved = index.resolve_latest(&h).unwrap().unwrap();
        assert_eq!(resolved.cache_id, old);
    }

    // -----------------------------------------------------------------------
    // Release
    // -----------------------------------------------------------------------

    #[test]
    fn release_last_id_removes_reference() {
        let (backend, index) = index();
        let h = hash("dd44");
        let id = CacheId::new();
        index.upsert_hash_ref(&h, &id, Utc::now()).unwrap();
        index.write_id_ref(&id_ref(&index, id, &h)).unwrap();

        match index.release_hash_ref(&h, &id).unwrap() {
            HashRelease::Removed { deleted, failed } => {
                assert_eq!(deleted.len(), 3);
                assert!(failed.is_empty());
            }
            other => panic!("unexpected release outcome: {other:?}"),
        }
        assert!(index.read_hash_ref(&h).unwrap().is_none());
        // The id reference itself is the caller's to delete.
        assert_eq!(backend.list("refs/by-id/").unwrap().len(), 3);
    }

    #[test]
    fn release_with_live_sibling_retains_reference() {
        let (_backend, index) = index();
        let h = hash("ee55");
        let a = CacheId::new();
        let b = CacheId::new();
        for id in [a, b] {
            index.upsert_hash_ref(&h, &id, Utc::now()).unwrap();
            index.write_id_ref(&id_ref(&index, id, &h)).unwrap();
        }
        assert_eq!(
            index.release_hash_ref(&h, &b).unwrap(),
            HashRelease::Retained { live_ids: 1 }
        );
        assert!(index.read_hash_ref(&h).unwrap().is_some());
    }

    #[test]
    fn release_missing_reference() {
        let (_backend, index) = index();
        assert_eq!(
            index.release_hash_ref(&hash("ff"), &CacheId::new()).unwrap(),
            HashRelease::Missing
        );
    }

    // -----------------------------------------------------------------------
    // Enumeration
    // -----------------------------------------------------------------------

    #[test]
    fn list_ids_and_hashes_skip_sidecars() {
        let (_backend, index) = index();
        let h1 = hash("1111");
        let h2 = hash("2222");
        let a = CacheId::new();
        let b = CacheId::new();
        index.upsert_hash_ref(&h1, &a, Utc::now()).unwrap();
        index.upsert_hash_ref(&h2, &b, Utc::now()).unwrap();
        index.write_id_ref(&id_ref(&index, a, &h1)).unwrap();
        index.write_id_ref(&id_ref(&index, b, &h2)).unwrap();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(index.list_ids().unwrap(), expected);
        assert_eq!(index.list_hashes().unwrap(), vec![h1, h2]);
    }
}
