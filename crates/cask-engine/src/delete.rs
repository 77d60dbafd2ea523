//! Best-effort removal of every file belonging to one cache id.
//!
//! Paths are deleted one by one in this order: content files, child files in
//! the data folders, the by-hash reference, and the by-id reference last. An
//! interrupted delete therefore leaves the IdReference in place and can be
//! retried.

use cask_refs::HashRelease;
use cask_store::StorageBackend;
use cask_types::{CacheId, Namespace};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::service::CacheService;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    Success,
    PartialFailure,
    NotFound,
}

/// Per-path outcome of a delete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub status: DeleteStatus,
    pub cache_id: CacheId,
    pub namespace: Namespace,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub deleted_count: usize,
    pub deleted_paths: Vec<String>,
    pub failed_count: usize,
    pub failed_paths: Vec<String>,
}

impl DeleteReport {
    fn not_found(cache_id: &CacheId, namespace: &Namespace) -> Self {
        Self {
            status: DeleteStatus::NotFound,
            cache_id: *cache_id,
            namespace: namespace.clone(),
            message: Some(format!("Cache ID {cache_id} not found")),
            deleted_count: 0,
            deleted_paths: Vec::new(),
            failed_count: 0,
            failed_paths: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DeleteStatus::Success
    }
}

/// Accumulates per-path results.
#[derive(Default)]
struct Outcome {
    deleted: Vec<String>,
    failed: Vec<String>,
}

impl Outcome {
    fn delete(&mut self, backend: &dyn StorageBackend, path: &str) {
        match backend.delete(path) {
            Ok(true) => self.deleted.push(path.to_string()),
            Ok(false) => {
                debug!(path, "path already gone");
                self.failed.push(path.to_string());
            }
            Err(e) => {
                warn!(path, error = %e, "delete failed");
                self.failed.push(path.to_string());
            }
        }
    }
}

impl CacheService {
    /// Delete an entry and everything attached to it.
    ///
    /// Never fails for an unknown id: the report says `not_found`. Store
    /// errors while enumerating child files are the only hard errors.
    pub fn delete_by_id(&self, cache_id: &CacheId, namespace: &Namespace) -> EngineResult<DeleteReport> {
        let handler = self.handler(namespace)?;
        let Some(id_ref) = handler.refs().read_id_ref(cache_id)? else {
            debug!(namespace = %namespace, cache_id = %cache_id, "delete of unknown id");
            return Ok(DeleteReport::not_found(cache_id, namespace));
        };
        let backend = handler.backend();
        let mut outcome = Outcome::default();

        for path in &id_ref.all_paths.data {
            outcome.delete(backend, path);
        }
        for folder in &id_ref.data_folders {
            for path in backend.list(&format!("{folder}/"))? {
                outcome.delete(backend, &path);
            }
        }
        match handler.refs().release_hash_ref(&id_ref.cache_hash, cache_id) {
            Ok(HashRelease::Removed { deleted, failed }) => {
                outcome.deleted.extend(deleted);
                outcome.failed.extend(failed);
            }
            Ok(HashRelease::Retained { live_ids }) => {
                debug!(cache_hash = %id_ref.cache_hash, live_ids, "hash reference kept for other ids");
            }
            Ok(HashRelease::Missing) => {}
            Err(e) => {
                warn!(cache_hash = %id_ref.cache_hash, error = %e, "hash reference release failed");
                outcome.failed.extend(id_ref.all_paths.by_hash.iter().cloned());
            }
        }
        // Sidecars before the record itself, so a retry still finds the record.
        for path in id_ref.all_paths.by_id.iter().rev() {
            outcome.delete(backend, path);
        }

        let status = if outcome.failed.is_empty() {
            DeleteStatus::Success
        } else {
            DeleteStatus::PartialFailure
        };
        info!(
            namespace = %namespace,
            cache_id = %cache_id,
            deleted = outcome.deleted.len(),
            failed = outcome.failed.len(),
            ?status,
            "deleted entry"
        );
        Ok(DeleteReport {
            status,
            cache_id: *cache_id,
            namespace: namespace.clone(),
            message: None,
            deleted_count: outcome.deleted.len(),
            deleted_paths: outcome.deleted,
            failed_count: outcome.failed.len(),
            failed_paths: outcome.failed,
        })
    }
}
