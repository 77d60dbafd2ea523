//! Child files attached under an entry's data folders.
//!
//! A child file lives at `{data_folder}/[{data_key}/]{data_file_id}.{ext}`
//! in every data folder of its parent. Child files have no sidecars and are
//! invisible to the hash and id indices: adding or removing one never
//! touches a reference record.
//!
//! Every operation first resolves the parent's IdReference. An unknown
//! parent yields `Ok(None)` so that no orphan files are ever created.

use std::sync::Arc;

use cask_refs::sidecar::is_sidecar;
use cask_refs::{validate_cache_key, validate_file_id};
use cask_types::{CacheId, DataType, Namespace, Payload};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::registry::NamespaceHandler;
use crate::service::CacheService;

/// Where a child file lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataFileAddress {
    pub cache_id: CacheId,
    pub namespace: Namespace,
    pub data_key: Option<String>,
    /// Required for every operation except store, which generates one.
    pub data_file_id: Option<String>,
    pub data_type: DataType,
}

impl DataFileAddress {
    pub fn new(cache_id: CacheId, namespace: Namespace, data_type: DataType) -> Self {
        Self {
            cache_id,
            namespace,
            data_key: None,
            data_file_id: None,
            data_type,
        }
    }

    pub fn with_data_key(mut self, key: impl Into<String>) -> Self {
        self.data_key = Some(key.into());
        self
    }

    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
        self.data_file_id = Some(file_id.into());
        self
    }

    fn key(&self) -> EngineResult<Option<&str>> {
        match self.data_key.as_deref() {
            None | Some("") => Ok(None),
            Some(key) => {
                validate_cache_key(key)?;
                Ok(Some(key))
            }
        }
    }

    fn file_id(&self) -> EngineResult<&str> {
        let id = self
            .data_file_id
            .as_deref()
            .ok_or_else(|| EngineError::InvalidInput("data_file_id is required".into()))?;
        validate_file_id(id)?;
        Ok(id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DataFileReceipt {
    pub cache_id: CacheId,
    pub data_file_id: String,
    pub data_key: Option<String>,
    pub data_type: DataType,
    /// Path in the first data folder.
    pub file_path: String,
    /// Every copy written, one per data folder.
    pub file_paths: Vec<String>,
    pub file_size: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetrievedDataFile {
    pub cache_id: CacheId,
    pub data_file_id: String,
    pub data_key: Option<String>,
    pub data_type: DataType,
    pub data: Payload,
    pub file_path: String,
    pub file_size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DataFileInfo {
    pub data_file_id: String,
    pub data_key: Option<String>,
    /// Derived from the extension. Unknown extensions read as binary.
    pub data_type: DataType,
    pub file_size: u64,
    pub file_path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DataFileListing {
    pub cache_id: CacheId,
    pub data_key: Option<String>,
    pub files: Vec<DataFileInfo>,
    pub file_count: usize,
    pub total_size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DataDeleteReport {
    pub cache_id: CacheId,
    pub deleted_count: usize,
    pub deleted_files: Vec<String>,
}

impl CacheService {
    // ---- Child files ----

    /// Write a child file into every data folder of its parent.
    ///
    /// Generates a UUID v7 `data_file_id` when none is given.
    pub fn store_data(&self, address: &DataFileAddress, payload: Payload) -> EngineResult<Option<DataFileReceipt>> {
        let Some((handler, folders)) = self.parent_folders(address)? else {
            return Ok(None);
        };
        let address = match address.data_file_id {
            Some(_) => address.clone(),
            None => address.clone().with_file_id(uuid::Uuid::now_v7().to_string()),
        };
        write_child(&handler, &folders, &address, payload).map(Some)
    }

    pub fn retrieve_data(&self, address: &DataFileAddress) -> EngineResult<Option<RetrievedDataFile>> {
        let Some((handler, folders)) = self.parent_folders(address)? else {
            return Ok(None);
        };
        let file_id = address.file_id()?;
        let key = address.key()?;
        let backend = handler.backend();
        for folder in &folders {
            let path = handler
                .layout()
                .data_file_path(folder, key, file_id, address.data_type);
            if let Some(bytes) = backend.get(&path)? {
                let file_size = bytes.len() as u64;
                return Ok(Some(RetrievedDataFile {
                    cache_id: address.cache_id,
                    data_file_id: file_id.to_string(),
                    data_key: key.map(str::to_string),
                    data_type: address.data_type,
                    data: Payload::from_bytes(address.data_type, bytes)?,
                    file_path: path,
                    file_size,
                }));
            }
        }
        debug!(cache_id = %address.cache_id, data_file_id = file_id, "child file not found");
        Ok(None)
    }

    /// Overwrite an existing child file. `Ok(None)` if it does not exist.
    pub fn update_data(&self, address: &DataFileAddress, payload: Payload) -> EngineResult<Option<DataFileReceipt>> {
        let Some((handler, folders)) = self.parent_folders(address)? else {
            return Ok(None);
        };
        if !child_exists(&handler, &folders, address)? {
            return Ok(None);
        }
        write_child(&handler, &folders, address, payload).map(Some)
    }

    /// Delete one child file from every data folder.
    ///
    /// `Ok(None)` when neither the parent nor any copy of the file exists.
    pub fn delete_data(&self, address: &DataFileAddress) -> EngineResult<Option<DataDeleteReport>> {
        let Some((handler, folders)) = self.parent_folders(address)? else {
            return Ok(None);
        };
        let file_id = address.file_id()?;
        let key = address.key()?;
        let mut deleted = Vec::new();
        for folder in &folders {
            let path = handler
                .layout()
                .data_file_path(folder, key, file_id, address.data_type);
            if handler.backend().delete(&path)? {
                deleted.push(path);
            }
        }
        if deleted.is_empty() {
            return Ok(None);
        }
        info!(cache_id = %address.cache_id, data_file_id = file_id, copies = deleted.len(), "deleted child file");
        Ok(Some(DataDeleteReport {
            cache_id: address.cache_id,
            deleted_count: deleted.len(),
            deleted_files: deleted,
        }))
    }

    pub fn data_exists(&self, address: &DataFileAddress) -> EngineResult<bool> {
        match self.parent_folders(address)? {
            Some((handler, folders)) => child_exists(&handler, &folders, address),
            None => Ok(false),
        }
    }

    /// List child files in the parent's first data folder.
    ///
    /// With `recursive` false only files directly under the folder (or
    /// under `data_key`) are listed.
    pub fn list_data_files(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        data_key: Option<&str>,
        recursive: bool,
    ) -> EngineResult<Option<DataFileListing>> {
        let address = DataFileAddress {
            data_key: data_key.map(str::to_string),
            ..DataFileAddress::new(*cache_id, namespace.clone(), DataType::Binary)
        };
        let Some((handler, folders)) = self.parent_folders(&address)? else {
            return Ok(None);
        };
        let key = address.key()?;
        let Some(folder) = folders.first() else {
            return Ok(Some(DataFileListing {
                cache_id: *cache_id,
                data_key: key.map(str::to_string),
                files: Vec::new(),
                file_count: 0,
                total_size: 0,
            }));
        };
        let base = match key {
            Some(key) => format!("{folder}/{key}/"),
            None => format!("{folder}/"),
        };

        let backend = handler.backend();
        let mut files = Vec::new();
        for path in backend.list(&base)? {
            let Some(rest) = path.strip_prefix(&base) else {
                continue;
            };
            if is_sidecar(rest) || (!recursive && rest.contains('/')) {
                continue;
            }
            let (sub_key, name) = match rest.rsplit_once('/') {
                Some((dir, name)) => (Some(dir), name),
                None => (None, rest),
            };
            let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
            let file_key = match (key, sub_key) {
                (Some(k), Some(s)) => Some(format!("{k}/{s}")),
                (Some(k), None) => Some(k.to_string()),
                (None, Some(s)) => Some(s.to_string()),
                (None, None) => None,
            };
            let file_size = match backend.get(&path)? {
                Some(bytes) => bytes.len() as u64,
                None => continue,
            };
            files.push(DataFileInfo {
                data_file_id: stem.to_string(),
                data_key: file_key,
                data_type: DataType::from_extension(ext),
                file_size,
                file_path: path,
            });
        }
        let total_size = files.iter().map(|f| f.file_size).sum();
        Ok(Some(DataFileListing {
            cache_id: *cache_id,
            data_key: key.map(str::to_string),
            file_count: files.len(),
            files,
            total_size,
        }))
    }

    /// Delete every child file of an entry, optionally only under `data_key`.
    ///
    /// Nothing to delete is a success with `deleted_count == 0`.
    pub fn delete_all_data(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        data_key: Option<&str>,
    ) -> EngineResult<Option<DataDeleteReport>> {
        let address = DataFileAddress {
            data_key: data_key.map(str::to_string),
            ..DataFileAddress::new(*cache_id, namespace.clone(), DataType::Binary)
        };
        let Some((handler, folders)) = self.parent_folders(&address)? else {
            return Ok(None);
        };
        let key = address.key()?;
        let mut deleted = Vec::new();
        for folder in &folders {
            let prefix = match key {
                Some(key) => format!("{folder}/{key}/"),
                None => format!("{folder}/"),
            };
            deleted.extend(handler.backend().delete_prefix(&prefix)?);
        }
        info!(cache_id = %cache_id, data_key = ?key, deleted = deleted.len(), "deleted child files");
        Ok(Some(DataDeleteReport {
            cache_id: *cache_id,
            deleted_count: deleted.len(),
            deleted_files: deleted,
        }))
    }

    fn parent_folders(
        &self,
        address: &DataFileAddress,
    ) -> EngineResult<Option<(Arc<NamespaceHandler>, Vec<String>)>> {
        let handler = self.handler(&address.namespace)?;
        match handler.refs().read_id_ref(&address.cache_id)? {
            Some(id_ref) => Ok(Some((handler, id_ref.data_folders))),
            None => {
                debug!(
                    namespace = %address.namespace,
                    cache_id = %address.cache_id,
                    "child file operation on unknown parent"
                );
                Ok(None)
            }
        }
    }
}

fn child_exists(handler: &NamespaceHandler, folders: &[String], address: &DataFileAddress) -> EngineResult<bool> {
    let file_id = address.file_id()?;
    let key = address.key()?;
    for folder in folders {
        let path = handler
            .layout()
            .data_file_path(folder, key, file_id, address.data_type);
        if handler.backend().exists(&path)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn write_child(
    handler: &NamespaceHandler,
    folders: &[String],
    address: &DataFileAddress,
    payload: Payload,
) -> EngineResult<DataFileReceipt> {
    if payload.data_type() != address.data_type {
        return Err(EngineError::UnsupportedMediaType {
            expected: address.data_type,
            stored: payload.data_type(),
        });
    }
    if payload.is_empty() {
        return Err(EngineError::InvalidInput("child file payload must not be empty".into()));
    }
    let file_id = address.file_id()?;
    let key = address.key()?;
    let bytes = payload.to_bytes()?;

    let mut written = Vec::with_capacity(folders.len());
    for folder in folders {
        let path = handler
            .layout()
            .data_file_path(folder, key, file_id, address.data_type);
        if let Err(e) = handler.backend().put(&path, &bytes) {
            warn!(path = %path, error = %e, "child file write failed");
            return Err(e.into());
        }
        written.push(path);
    }
    let Some(first) = written.first().cloned() else {
        return Err(EngineError::Internal(format!(
            "entry {} has no data folders",
            address.cache_id
        )));
    };
    info!(
        cache_id = %address.cache_id,
        data_file_id = file_id,
        data_key = ?key,
        copies = written.len(),
        size = bytes.len(),
        "stored child file"
    );
    Ok(DataFileReceipt {
        cache_id: address.cache_id,
        data_file_id: file_id.to_string(),
        data_key: key.map(str::to_string),
        data_type: address.data_type,
        file_path: first,
        file_paths: written,
        file_size: bytes.len() as u64,
    })
}
