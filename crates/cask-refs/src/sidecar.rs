//! Files written with `.config` and `.metadata` sidecars.
//!
//! Every content file and every reference record is stored as a set of three
//! paths: the file itself, `{path}.config` naming the file, and
//! `{path}.metadata` with a BLAKE3 checksum, size, and (for content files)
//! the entry's [`EntryMetadata`].

use cask_store::{BackendExt, StorageBackend, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::EntryMetadata;

pub const CONFIG_SUFFIX: &str = ".config";
pub const METADATA_SUFFIX: &str = ".metadata";

/// Contents of a `.config` sidecar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    pub file_id: String,
    pub extension: String,
    pub stored_at: DateTime<Utc>,
}

/// Contents of a `.metadata` sidecar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// BLAKE3 hex digest of the stored bytes.
    pub content_hash: String,
    pub content_size: u64,
    pub stored_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<EntryMetadata>,
}

impl FileMetadata {
    /// Describe `bytes` as stored at `stored_at`.
    pub fn describe(bytes: &[u8], stored_at: DateTime<Utc>, entry: Option<EntryMetadata>) -> Self {
        Self {
            content_hash: blake3::hash(bytes).to_hex().to_string(),
            content_size: bytes.len() as u64,
            stored_at,
            entry,
        }
    }

    /// Check that `bytes` match the recorded checksum and size.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        self.content_size == bytes.len() as u64
            && self.content_hash == blake3::hash(bytes).to_hex().as_str()
    }
}

/// The file, config, and metadata paths for `path`, in write order.
pub fn sidecar_paths(path: &str) -> [String; 3] {
    [
        path.to_string(),
        format!("{path}{CONFIG_SUFFIX}"),
        format!("{path}{METADATA_SUFFIX}"),
    ]
}

/// Returns `true` if `path` names a sidecar rather than a primary file.
pub fn is_sidecar(path: &str) -> bool {
    path.ends_with(CONFIG_SUFFIX) || path.ends_with(METADATA_SUFFIX)
}

/// Write `bytes` at `path` followed by its two sidecars.
///
/// The primary file is written first; if that fails nothing else is
/// written. Returns the three paths written.
pub fn write_file_set(
    backend: &dyn StorageBackend,
    path: &str,
    bytes: &[u8],
    file_id: &str,
    stored_at: DateTime<Utc>,
    entry: Option<EntryMetadata>,
) -> StoreResult<Vec<String>> {
    let [file, config_path, metadata_path] = sidecar_paths(path);
    backend.put(&file, bytes)?;

    let extension = path
        .rsplit_once('/')
        .map_or(path, |(_, name)| name)
        .rsplit_once('.')
        .map_or("", |(_, ext)| ext)
        .to_string();
    let config = FileConfig {
        file_id: file_id.to_string(),
        extension,
        stored_at,
    };
    backend.put_json(&config_path, &config)?;
    backend.put_json(&metadata_path, &FileMetadata::describe(bytes, stored_at, entry))?;
    Ok(vec![file, config_path, metadata_path])
}

/// Read the `.metadata` sidecar of `path`.
pub fn read_metadata(backend: &dyn StorageBackend, path: &str) -> StoreResult<Option<FileMetadata>> {
    backend.get_json(&format!("{path}{METADATA_SUFFIX}"))
}

/// Read the `.config` sidecar of `path`.
pub fn read_config(backend: &dyn StorageBackend, path: &str) -> StoreResult<Option<FileConfig>> {
    backend.get_json(&format!("{path}{CONFIG_SUFFIX}"))
}
