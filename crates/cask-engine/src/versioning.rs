//! Copy-on-write edits to stored zip archives.
//!
//! A zip entry is never modified. Every edit extracts the archive into an
//! in-memory [`ZipContents`], applies the requested steps there, and stores
//! the result as a brand-new entry. Each batch moves through
//!
//! ```text
//! Received -> Validated -> Staged -> Committed
//!                                 \-> Rejected
//! ```
//!
//! An atomic batch that hits a failing step is rejected: the staged copy is
//! discarded and the source entry is left exactly as it was.

use cask_refs::IdReference;
use cask_types::{CacheHash, CacheId, DataType, Namespace, Strategy};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::archive::ZipContents;
use crate::error::{EngineError, EngineResult};
use crate::retrieve::read_entry;
use crate::service::CacheService;
use crate::store::{StoreReceipt, StoreRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZipAction {
    Add,
    Remove,
    Replace,
    Move,
}

/// Precondition on the step's `path`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZipCondition {
    #[default]
    Always,
    IfExists,
    IfNotExists,
}

/// One step of a batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZipOperation {
    pub action: ZipAction,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
    /// Glob selecting files for `remove`, instead of `path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    #[serde(default)]
    pub condition: ZipCondition,
}

impl ZipOperation {
    fn new(action: ZipAction, path: impl Into<String>) -> Self {
        Self {
            action,
            path: path.into(),
            content: None,
            pattern: None,
            new_path: None,
            condition: ZipCondition::Always,
        }
    }

    pub fn add(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::new(ZipAction::Add, path)
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::new(ZipAction::Remove, path)
    }

    pub fn remove_matching(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            ..Self::new(ZipAction::Remove, "")
        }
    }

    pub fn replace(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::new(ZipAction::Replace, path)
        }
    }

    pub fn move_to(path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            new_path: Some(new_path.into()),
            ..Self::new(ZipAction::Move, path)
        }
    }

    pub fn when(mut self, condition: ZipCondition) -> Self {
        self.condition = condition;
        self
    }
}

fn default_atomic() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub operations: Vec<ZipOperation>,
    #[serde(default = "default_atomic")]
    pub atomic: bool,
}

impl BatchRequest {
    pub fn atomic(operations: Vec<ZipOperation>) -> Self {
        Self {
            operations,
            atomic: true,
        }
    }

    pub fn best_effort(operations: Vec<ZipOperation>) -> Self {
        Self {
            operations,
            atomic: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub action: ZipAction,
    pub path: String,
    pub success: bool,
    /// The step's condition was not met; nothing changed.
    pub skipped: bool,
    pub files_affected: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Received,
    Validated,
    Staged,
    Committed,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub success: bool,
    pub state: BatchState,
    /// The committed entry, or the source entry when nothing was committed.
    pub cache_id: CacheId,
    pub original_cache_id: CacheId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_hash: Option<CacheHash>,
    pub operations_applied: usize,
    pub operations_failed: usize,
    pub operation_results: Vec<OperationResult>,
    pub files_added: Vec<String>,
    pub files_removed: Vec<String>,
    pub files_modified: Vec<String>,
    pub file_count: usize,
    pub size: u64,
    pub rollback_performed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl BatchReport {
    pub fn committed(&self) -> bool {
        self.state == BatchState::Committed
    }
}

/// Result of a single-step edit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ZipOperationResult {
    pub success: bool,
    pub cache_id: CacheId,
    pub original_cache_id: CacheId,
    pub files_affected: Vec<String>,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ZipStoreReceipt {
    #[serde(flatten)]
    pub receipt: StoreReceipt,
    pub file_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ZipFileInfo {
    pub path: String,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ZipListing {
    pub cache_id: CacheId,
    pub files: Vec<ZipFileInfo>,
    pub file_count: usize,
    pub total_size: u64,
}

enum Step {
    Applied(Vec<String>),
    Skipped,
}

impl CacheService {
    // ---- Zip store and reads ----

    /// Validate and store a zip archive as a binary entry.
    pub fn store_zip(&self, bytes: Vec<u8>, namespace: &Namespace, strategy: Strategy) -> EngineResult<ZipStoreReceipt> {
        self.store_zip_with(
            StoreRequest::binary(bytes)
                .in_namespace(namespace.clone())
                .with_strategy(strategy),
        )
    }

    /// Like [`store_zip`](Self::store_zip) with full control over the request.
    ///
    /// Unless the request carries an explicit hash or a cache key, the entry
    /// is hashed by its contents, so the same files zipped twice share a hash.
    pub fn store_zip_with(&self, request: StoreRequest) -> EngineResult<ZipStoreReceipt> {
        let bytes = request.payload.as_bytes().ok_or(EngineError::UnsupportedMediaType {
            expected: DataType::Binary,
            stored: request.payload.data_type(),
        })?;
        if bytes.is_empty() {
            return Err(EngineError::InvalidInput("zip bytes must not be empty".into()));
        }
        let contents = ZipContents::from_bytes(bytes)?;
        let request = if request.cache_hash.is_none() && request.cache_key.is_none() {
            let hash = contents.content_hash(self.hasher());
            request.with_cache_hash(hash)
        } else {
            request
        };
        let receipt = self.store(request)?;
        info!(cache_id = %receipt.cache_id, files = contents.len(), "stored zip archive");
        Ok(ZipStoreReceipt {
            receipt,
            file_count: contents.len(),
        })
    }

    pub fn zip_list(&self, cache_id: &CacheId, namespace: &Namespace) -> EngineResult<Option<ZipListing>> {
        let Some((_, contents)) = self.load_zip(cache_id, namespace)? else {
            return Ok(None);
        };
        let files: Vec<ZipFileInfo> = contents
            .paths()
            .into_iter()
            .map(|path| {
                let size = contents.get(&path).map_or(0, |c| c.len() as u64);
                ZipFileInfo { path, size }
            })
            .collect();
        Ok(Some(ZipListing {
            cache_id: *cache_id,
            file_count: files.len(),
            total_size: contents.total_size(),
            files,
        }))
    }

    /// One file from the archive. `Ok(None)` if the entry or file is missing.
    pub fn zip_get_file(&self, cache_id: &CacheId, namespace: &Namespace, path: &str) -> EngineResult<Option<Vec<u8>>> {
        Ok(self
            .load_zip(cache_id, namespace)?
            .and_then(|(_, contents)| contents.get(path).map(<[u8]>::to_vec)))
    }

    /// The archive bytes as stored.
    pub fn zip_download(&self, cache_id: &CacheId, namespace: &Namespace) -> EngineResult<Option<Vec<u8>>> {
        let handler = self.handler(namespace)?;
        let Some(id_ref) = handler.refs().read_id_ref(cache_id)? else {
            return Ok(None);
        };
        require_binary(&id_ref)?;
        match read_entry(&handler, &id_ref)? {
            Some(entry) => Ok(Some(entry.into_bytes()?)),
            None => Ok(None),
        }
    }

    // ---- Single-step edits ----

    pub fn zip_add(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        path: &str,
        content: Vec<u8>,
    ) -> EngineResult<Option<ZipOperationResult>> {
        self.zip_single(cache_id, namespace, ZipOperation::add(path, content))
    }

    pub fn zip_remove(&self, cache_id: &CacheId, namespace: &Namespace, path: &str) -> EngineResult<Option<ZipOperationResult>> {
        self.zip_single(cache_id, namespace, ZipOperation::remove(path))
    }

    pub fn zip_replace(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        path: &str,
        content: Vec<u8>,
    ) -> EngineResult<Option<ZipOperationResult>> {
        self.zip_single(cache_id, namespace, ZipOperation::replace(path, content))
    }

    pub fn zip_move(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        path: &str,
        new_path: &str,
    ) -> EngineResult<Option<ZipOperationResult>> {
        self.zip_single(cache_id, namespace, ZipOperation::move_to(path, new_path))
    }

    fn zip_single(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        operation: ZipOperation,
    ) -> EngineResult<Option<ZipOperationResult>> {
        let action = operation.action;
        let Some(report) = self.zip_batch(cache_id, namespace, &BatchRequest::atomic(vec![operation]))? else {
            return Ok(None);
        };
        let step = report.operation_results.into_iter().next();
        let files_affected = step.as_ref().map(|s| s.files_affected.clone()).unwrap_or_default();
        let message = match (&report.error_message, report.state) {
            (Some(error), _) => error.clone(),
            (None, BatchState::Committed) => format!("{action:?} applied to {} file(s)", files_affected.len()),
            (None, state) => format!("nothing committed ({state:?})"),
        };
        Ok(Some(ZipOperationResult {
            success: report.success && report.state == BatchState::Committed,
            cache_id: report.cache_id,
            original_cache_id: report.original_cache_id,
            files_affected,
            message,
        }))
    }

    // ---- Batch ----

    /// Apply a batch of edits to a copy of a zip entry.
    ///
    /// Returns `Ok(None)` if the source entry does not exist. Step failures
    /// are reported in the [`BatchReport`], not as errors.
    pub fn zip_batch(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        request: &BatchRequest,
    ) -> EngineResult<Option<BatchReport>> {
        if request.operations.is_empty() {
            return Err(EngineError::InvalidInput("batch has no operations".into()));
        }
        debug!(cache_id = %cache_id, steps = request.operations.len(), state = ?BatchState::Received, "zip batch");
        let Some((source, mut staged)) = self.load_zip(cache_id, namespace)? else {
            return Ok(None);
        };
        let original_count = staged.len();
        debug!(cache_id = %cache_id, files = original_count, state = ?BatchState::Validated, "zip batch");

        let mut report = BatchReport {
            success: false,
            state: BatchState::Validated,
            cache_id: *cache_id,
            original_cache_id: *cache_id,
            cache_hash: None,
            operations_applied: 0,
            operations_failed: 0,
            operation_results: Vec::with_capacity(request.operations.len()),
            files_added: Vec::new(),
            files_removed: Vec::new(),
            files_modified: Vec::new(),
            file_count: original_count,
            size: 0,
            rollback_performed: false,
            error_message: None,
        };

        for (index, operation) in request.operations.iter().enumerate() {
            match apply(&mut staged, operation) {
                Ok(Step::Applied(affected)) => {
                    report.operations_applied += 1;
                    match operation.action {
                        ZipAction::Add => report.files_added.extend(affected.iter().cloned()),
                        ZipAction::Remove => report.files_removed.extend(affected.iter().cloned()),
                        ZipAction::Replace | ZipAction::Move => {
                            report.files_modified.extend(affected.iter().cloned())
                        }
                    }
                    report.operation_results.push(result(operation, true, false, affected, None));
                }
                Ok(Step::Skipped) => {
                    report.operations_applied += 1;
                    report.operation_results.push(result(operation, true, true, Vec::new(), None));
                }
                Err(error) => {
                    report.operations_failed += 1;
                    report
                        .operation_results
                        .push(result(operation, false, false, Vec::new(), Some(error.clone())));
                    if request.atomic {
                        warn!(cache_id = %cache_id, step = index, error = %error, "atomic zip batch rejected");
                        report.state = BatchState::Rejected;
                        report.rollback_performed = true;
                        report.error_message = Some(format!("atomic batch failed at step {index}: {error}"));
                        return Ok(Some(report));
                    }
                    debug!(cache_id = %cache_id, step = index, error = %error, "zip step failed; continuing");
                }
            }
        }
        report.state = BatchState::Staged;
        report.file_count = staged.len();

        if report.operations_applied == 0 {
            report.state = BatchState::Rejected;
            report.error_message = Some("no operation succeeded".into());
            return Ok(Some(report));
        }

        let bytes = staged.to_bytes()?;
        let commit = StoreRequest::binary(bytes)
            .in_namespace(namespace.clone())
            .with_strategy(source.strategy);
        let commit = match &source.cache_key {
            Some(key) => commit.with_cache_key(key.clone()),
            None => commit.with_cache_hash(staged.content_hash(self.hasher())),
        };
        let receipt = self.store(commit)?;

        report.state = BatchState::Committed;
        report.success = report.operations_failed == 0;
        report.cache_id = receipt.cache_id;
        report.cache_hash = Some(receipt.cache_hash);
        report.size = receipt.size;
        info!(
            original = %cache_id,
            cache_id = %receipt.cache_id,
            applied = report.operations_applied,
            failed = report.operations_failed,
            "committed zip batch"
        );
        Ok(Some(report))
    }

    fn load_zip(&self, cache_id: &CacheId, namespace: &Namespace) -> EngineResult<Option<(IdReference, ZipContents)>> {
        let handler = self.handler(namespace)?;
        let Some(id_ref) = handler.refs().read_id_ref(cache_id)? else {
            debug!(namespace = %namespace, cache_id = %cache_id, "zip entry not found");
            return Ok(None);
        };
        require_binary(&id_ref)?;
        let Some(entry) = read_entry(&handler, &id_ref)? else {
            return Ok(None);
        };
        let contents = ZipContents::from_bytes(&entry.into_bytes()?)?;
        Ok(Some((id_ref, contents)))
    }
}

fn require_binary(id_ref: &IdReference) -> EngineResult<()> {
    if id_ref.data_type == DataType::Binary {
        Ok(())
    } else {
        Err(EngineError::UnsupportedMediaType {
            expected: DataType::Binary,
            stored: id_ref.data_type,
        })
    }
}

fn result(
    operation: &ZipOperation,
    success: bool,
    skipped: bool,
    files_affected: Vec<String>,
    error: Option<String>,
) -> OperationResult {
    OperationResult {
        action: operation.action,
        path: operation.path.clone(),
        success,
        skipped,
        files_affected,
        error,
    }
}

fn check_entry_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("path is required".into());
    }
    if path.starts_with('/') || path.contains('\\') || path.split('/').any(|s| s.is_empty() || s == "..") {
        return Err(format!("invalid archive path: {path:?}"));
    }
    Ok(())
}

/// Apply one step to the staged archive.
fn apply(staged: &mut ZipContents, operation: &ZipOperation) -> Result<Step, String> {
    let exists = staged.contains(&operation.path);
    match operation.condition {
        ZipCondition::IfExists if !exists => return Ok(Step::Skipped),
        ZipCondition::IfNotExists if exists => return Ok(Step::Skipped),
        _ => {}
    }

    let path = operation.path.as_str();
    match operation.action {
        ZipAction::Add => {
            check_entry_path(path)?;
            let content = operation
                .content
                .clone()
                .ok_or_else(|| format!("content required to add {path}"))?;
            staged.insert(path, content);
            Ok(Step::Applied(vec![path.to_string()]))
        }
        ZipAction::Remove => match &operation.pattern {
            Some(pattern) => {
                let pattern = Pattern::new(pattern).map_err(|e| format!("bad pattern {pattern:?}: {e}"))?;
                let matched: Vec<String> = staged
                    .paths()
                    .into_iter()
                    .filter(|p| pattern.matches(p))
                    .collect();
                for p in &matched {
                    staged.remove(p);
                }
                Ok(Step::Applied(matched))
            }
            None => {
                check_entry_path(path)?;
                staged
                    .remove(path)
                    .ok_or_else(|| format!("{path} not found in archive"))?;
                Ok(Step::Applied(vec![path.to_string()]))
            }
        },
        ZipAction::Replace => {
            if !exists {
                return Err(format!("{path} not found in archive"));
            }
            let content = operation
                .content
                .clone()
                .ok_or_else(|| format!("content required to replace {path}"))?;
            staged.insert(path, content);
            Ok(Step::Applied(vec![path.to_string()]))
        }
        ZipAction::Move => {
            let new_path = operation
                .new_path
                .as_deref()
                .ok_or_else(|| format!("new_path required to move {path}"))?;
            check_entry_path(new_path)?;
            let content = staged
                .remove(path)
                .ok_or_else(|| format!("{path} not found in archive"))?;
            staged.insert(new_path, content);
            Ok(Step::Applied(vec![path.to_string(), new_path.to_string()]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn ns() -> Namespace {
        Namespace::new("zips").unwrap()
    }

    fn archive(files: &[(&str, &str)]) -> Vec<u8> {
        files
            .iter()
            .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
            .collect::<ZipContents>()
            .to_bytes()
            .unwrap()
    }

    fn stored_ab(service: &CacheService) -> CacheId {
        service
            .store_zip(archive(&[("a.txt", "A"), ("b.txt", "B")]), &ns(), Strategy::Direct)
            .unwrap()
            .receipt
            .cache_id
    }

    fn paths(service: &CacheService, id: &CacheId) -> Vec<String> {
        service
            .zip_list(id, &ns())
            .unwrap()
            .unwrap()
            .files
            .into_iter()
            .map(|f| f.path)
            .collect()
    }

    #[test]
    fn store_zip_hashes_by_contents() {
        let service = CacheService::in_memory();
        let bytes = archive(&[("x/1.txt", "one"), ("2.txt", "two")]);
        let stored = service.store_zip(bytes.clone(), &ns(), Strategy::Temporal).unwrap();
        assert_eq!(stored.file_count, 2);
        assert_eq!(stored.receipt.data_type, DataType::Binary);
        let expected = ZipContents::from_bytes(&bytes).unwrap().content_hash(service.hasher());
        assert_eq!(stored.receipt.cache_hash, expected);
        assert_eq!(
            service.zip_download(&stored.receipt.cache_id, &ns()).unwrap(),
            Some(bytes)
        );
    }

    #[test]
    fn store_zip_rejects_bad_input() {
        let service = CacheService::in_memory();
        let err = service.store_zip(b"nope".to_vec(), &ns(), Strategy::Direct).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = service.store_zip(Vec::new(), &ns(), Strategy::Direct).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = service.store_zip_with(StoreRequest::string("zip")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedMediaType);
    }

    #[test]
    fn add_creates_new_entry_and_leaves_original() {
        let service = CacheService::in_memory();
        let original = stored_ab(&service);
        let result = service
            .zip_add(&original, &ns(), "c.txt", b"C".to_vec())
            .unwrap()
            .unwrap();
        assert!(result.success);
        assert_ne!(result.cache_id, original);
        assert_eq!(result.original_cache_id, original);
        assert_eq!(result.files_affected, vec!["c.txt"]);
        assert_eq!(paths(&service, &result.cache_id), vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(paths(&service, &original), vec!["a.txt", "b.txt"]);
        assert_eq!(
            service.zip_get_file(&result.cache_id, &ns(), "c.txt").unwrap(),
            Some(b"C".to_vec())
        );
    }

    #[test]
    fn remove_replace_and_move() {
        let service = CacheService::in_memory();
        let original = stored_ab(&service);

        let removed = service.zip_remove(&original, &ns(), "a.txt").unwrap().unwrap();
        assert_eq!(paths(&service, &removed.cache_id), vec!["b.txt"]);

        let replaced = service
            .zip_replace(&original, &ns(), "b.txt", b"B2".to_vec())
            .unwrap()
            .unwrap();
        assert_eq!(
            service.zip_get_file(&replaced.cache_id, &ns(), "b.txt").unwrap(),
            Some(b"B2".to_vec())
        );

        let moved = service.zip_move(&original, &ns(), "a.txt", "docs/a.txt").unwrap().unwrap();
        assert_eq!(moved.files_affected, vec!["a.txt", "docs/a.txt"]);
        assert_eq!(paths(&service, &moved.cache_id), vec!["b.txt", "docs/a.txt"]);

        let missing = service.zip_remove(&original, &ns(), "zzz.txt").unwrap().unwrap();
        assert!(!missing.success);
        assert_eq!(missing.cache_id, original);
    }

    #[test]
    fn atomic_batch_rolls_back() {
        let service = CacheService::in_memory();
        let original = stored_ab(&service);
        let ids_before = service.list_ids(&ns()).unwrap();

        let report = service
            .zip_batch(
                &original,
                &ns(),
                &BatchRequest::atomic(vec![
                    ZipOperation::add("c.txt", "C"),
                    ZipOperation::replace("missing.txt", "X"),
                ]),
            )
            .unwrap()
            .unwrap();
        assert!(!report.success);
        assert_eq!(report.state, BatchState::Rejected);
        assert!(report.rollback_performed);
        assert_eq!(report.cache_id, original);
        assert_eq!(report.operations_applied, 1);
        assert_eq!(report.operations_failed, 1);
        assert!(report.error_message.is_some());
        assert_eq!(paths(&service, &original), vec!["a.txt", "b.txt"]);
        assert_eq!(service.list_ids(&ns()).unwrap(), ids_before);
    }

    #[test]
    fn best_effort_batch_commits_successful_steps() {
        let service = CacheService::in_memory();
        let original = stored_ab(&service);
        let report = service
            .zip_batch(
                &original,
                &ns(),
                &BatchRequest::best_effort(vec![
                    ZipOperation::add("c.txt", "C"),
                    ZipOperation::replace("missing.txt", "X"),
                ]),
            )
            .unwrap()
            .unwrap();
        assert!(!report.success);
        assert!(report.committed());
        assert!(!report.rollback_performed);
        assert_ne!(report.cache_id, original);
        assert_eq!(report.files_added, vec!["c.txt"]);
        assert_eq!(report.operation_results.len(), 2);
        assert!(report.operation_results[1].error.is_some());
        assert_eq!(paths(&service, &report.cache_id), vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(paths(&service, &original), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn conditions_and_patterns() {
        let service = CacheService::in_memory();
        let original = service
            .store_zip(
                archive(&[("a.txt", "A"), ("b.log", "B"), ("c.log", "C")]),
                &ns(),
                Strategy::Direct,
            )
            .unwrap()
            .receipt
            .cache_id;
        let report = service
            .zip_batch(
                &original,
                &ns(),
                &BatchRequest::atomic(vec![
                    ZipOperation::add("a.txt", "again").when(ZipCondition::IfNotExists),
                    ZipOperation::remove("nope.txt").when(ZipCondition::IfExists),
                    ZipOperation::remove_matching("*.log"),
                ]),
            )
            .unwrap()
            .unwrap();
        assert!(report.success);
        assert_eq!(report.operations_applied, 3);
        assert!(report.operation_results[0].skipped);
        assert!(report.operation_results[1].skipped);
        assert_eq!(report.files_removed, vec!["b.log", "c.log"]);
        assert_eq!(paths(&service, &report.cache_id), vec!["a.txt"]);
        assert_eq!(
            service.zip_get_file(&report.cache_id, &ns(), "a.txt").unwrap(),
            Some(b"A".to_vec())
        );
    }

    #[test]
    fn committed_entry_keeps_strategy_and_key() {
        let service = CacheService::in_memory();
        let original = service
            .store_zip_with(
                StoreRequest::binary(archive(&[("a.txt", "A")]))
                    .in_namespace(ns())
                    .with_strategy(Strategy::KeyBased)
                    .with_cache_key("bundles/site"),
            )
            .unwrap()
            .receipt
            .cache_id;
        let result = service
            .zip_add(&original, &ns(), "b.txt", b"B".to_vec())
            .unwrap()
            .unwrap();
        let refs = service.entry_refs(&result.cache_id, &ns()).unwrap().unwrap();
        assert_eq!(refs.strategy, Strategy::KeyBased);
        assert_eq!(refs.cache_key.as_deref(), Some("bundles/site"));
        assert_eq!(refs.cache_hash, service.hasher().from_string("bundles/site"));
        assert!(service.retrieve_by_id(&original, &ns()).unwrap().is_some());
        // Both versions share the key hash; it resolves to the newer one.
        let newest = service.retrieve_by_hash(&refs.cache_hash, &ns()).unwrap().unwrap();
        assert_eq!(newest.cache_id, result.cache_id);
    }

    #[test]
    fn unknown_and_non_zip_sources() {
        let service = CacheService::in_memory();
        assert!(service.zip_list(&CacheId::new(), &ns()).unwrap().is_none());
        assert!(service
            .zip_add(&CacheId::new(), &ns(), "a", b"a".to_vec())
            .unwrap()
            .is_none());

        let text = service.store_string("plain", &ns(), Strategy::Direct).unwrap();
        let err = service.zip_list(&text.cache_id, &ns()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedMediaType);

        let blob = service.store_binary(b"not a zip".to_vec(), &ns(), Strategy::Direct).unwrap();
        let err = service.zip_list(&blob.cache_id, &ns()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn step_validation() {
        let mut staged: ZipContents = [("a".to_string(), b"1".to_vec())].into_iter().collect();
        assert!(apply(&mut staged, &ZipOperation::add("../escape", "x")).is_err());
        assert!(apply(&mut staged, &ZipOperation::add("/abs", "x")).is_err());
        assert!(apply(&mut staged, &ZipOperation::new(ZipAction::Add, "b")).is_err());
        assert!(apply(&mut staged, &ZipOperation::new(ZipAction::Move, "a")).is_err());
        assert!(apply(&mut staged, &ZipOperation::remove_matching("[")).is_err());
        assert_eq!(staged.paths(), vec!["a"]);
    }

    #[test]
    fn batch_request_json_defaults_to_atomic() {
        let request: BatchRequest = serde_json::from_str(
            r#"{"operations": [{"action": "remove", "pattern": "*.tmp"}]}"#,
        )
        .unwrap();
        assert!(request.atomic);
        assert_eq!(request.operations[0].condition, ZipCondition::Always);
        assert_eq!(request.operations[0].pattern.as_deref(), Some("*.tmp"));
    }

    #[test]
    fn empty_batch_is_invalid() {
        let service = CacheService::in_memory();
        let original = stored_ab(&service);
        let err = service
            .zip_batch(&original, &ns(), &BatchRequest::atomic(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }
}
