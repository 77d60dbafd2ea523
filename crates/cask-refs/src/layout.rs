//! Strategy-driven path layout.
//!
//! Every path is relative to a namespace's backend:
//!
//! ```text
//! data/direct/{s1}/{s2}/{file_id}.{ext}
//! data/temporal/{YYYY}/{MM}/{DD}/{HH}/{file_id}.{ext}
//! data/temporal-latest/{YYYY}/{MM}/{DD}/{HH}/{file_id}.{ext}
//! data/temporal-latest/latest/{file_id}.{ext}
//! data/temporal-versioned/.../versions/v{n}/{file_id}.{ext}
//! data/key-based/{cache_key}/{file_id}.{ext}
//! refs/by-hash/{s1}/{s2}/{hash}.json
//! refs/by-id/{s1}/{s2}/{cache_id}.json
//! ```
//!
//! The temporal bucket is computed once at store time and recorded in the
//! IdReference. Nothing reads an entry by recomputing it.
//!
//! Cache keys and file ids are validated before they become path segments:
//! - Must be non-empty
//! - Only `[A-Za-z0-9_.-]` (plus `/` between key components)
//! - Components must not be empty or start with `.`

use cask_types::{CacheHash, CacheId, DataType, Strategy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RefError, Result};

pub const DATA_ROOT: &str = "data";
pub const REFS_BY_HASH: &str = "refs/by-hash";
pub const REFS_BY_ID: &str = "refs/by-id";

const LATEST_FOLDER: &str = "latest";
const VERSIONS_FOLDER: &str = "versions";
const DATA_FOLDER: &str = "data";
const MAX_KEY_LEN: usize = 256;
const MAX_FILE_ID_LEN: usize = 128;

/// Sharding parameters for reference and direct paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Number of shard directories.
    pub shard_depth: usize,
    /// Characters per shard directory.
    pub shard_width: usize,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            shard_depth: 2,
            shard_width: 2,
        }
    }
}

/// Context needed to place an entry's content files.
#[derive(Clone, Debug)]
pub struct PathRequest<'a> {
    pub strategy: Strategy,
    pub file_id: &'a str,
    pub cache_key: Option<&'a str>,
    pub data_type: DataType,
    pub timestamp: DateTime<Utc>,
    /// Version number for `TemporalVersioned`; ignored otherwise.
    pub version: u32,
}

/// Every path an entry will occupy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPaths {
    pub content: Vec<String>,
    pub by_hash: String,
    pub by_id: String,
    pub data_folders: Vec<String>,
}

/// Path resolver for one namespace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Layout {
    config: LayoutConfig,
}

impl Layout {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Shard directories for a key: `"e15b31f8"` → `"e1/5b"`.
    ///
    /// Keys shorter than the shard span produce fewer directories.
    pub fn shard(&self, key: &str) -> String {
        let chars: Vec<char> = key.chars().collect();
        chars
            .chunks(self.config.shard_width.max(1))
            .take(self.config.shard_depth)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn sharded(&self, root: &str, key: &str, file_name: &str) -> String {
        let shard = self.shard(key);
        if shard.is_empty() {
            format!("{root}/{file_name}")
        } else {
            format!("{root}/{shard}/{file_name}")
        }
    }

    /// Location of the HashReference for `hash`.
    pub fn hash_ref_path(&self, hash: &CacheHash) -> String {
        self.sharded(REFS_BY_HASH, hash.as_str(), &format!("{hash}.json"))
    }

    /// Location of the IdReference for `id`.
    pub fn id_ref_path(&self, id: &CacheId) -> String {
        let id = id.to_string();
        self.sharded(REFS_BY_ID, &id, &format!("{id}.json"))
    }

    /// Folder holding one strategy's content.
    pub fn strategy_root(&self, strategy: Strategy) -> String {
        format!("{DATA_ROOT}/{}", strategy.folder())
    }

    /// Prefix under which `TemporalVersioned` keeps numbered copies.
    pub fn versions_prefix(&self) -> String {
        format!(
            "{}/{VERSIONS_FOLDER}/",
            self.strategy_root(Strategy::TemporalVersioned)
        )
    }

    /// The next version number for `file_id`, given the paths currently
    /// stored under [`versions_prefix`](Self::versions_prefix).
    pub fn next_version(&self, existing: &[String], file_id: &str, data_type: DataType) -> u32 {
        let prefix = self.versions_prefix();
        let file_name = format!("{file_id}.{}", data_type.extension());
        existing
            .iter()
            .filter_map(|path| {
                let rest = path.strip_prefix(&prefix)?;
                let (version, name) = rest.split_once('/')?;
                if name != file_name {
                    return None;
                }
                version.strip_prefix('v')?.parse::<u32>().ok()
            })
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Content paths for a store request, in write order.
    pub fn content_paths(&self, req: &PathRequest<'_>) -> Result<Vec<String>> {
        validate_file_id(req.file_id)?;
        let file_name = format!("{}.{}", req.file_id, req.data_type.extension());
        let root = self.strategy_root(req.strategy);
        let bucket = req.timestamp.format("%Y/%m/%d/%H").to_string();

        let paths = match req.strategy {
            Strategy::Direct => vec![self.sharded(&root, req.file_id, &file_name)],
            Strategy::Temporal => vec![format!("{root}/{bucket}/{file_name}")],
            Strategy::TemporalLatest => vec![
                format!("{root}/{bucket}/{file_name}"),
                format!("{root}/{LATEST_FOLDER}/{file_name}"),
            ],
            Strategy::TemporalVersioned => vec![
                format!("{root}/{bucket}/{file_name}"),
                format!("{root}/{LATEST_FOLDER}/{file_name}"),
                format!("{root}/{VERSIONS_FOLDER}/v{}/{file_name}", req.version.max(1)),
            ],
            Strategy::KeyBased => {
                let key = req
                    .cache_key
                    .ok_or_else(|| RefError::MissingCacheKey(req.strategy.to_string()))?;
                validate_cache_key(key)?;
                vec![format!("{root}/{key}/{file_name}")]
            }
        };
        Ok(paths)
    }

    /// Resolve content, reference, and child-data paths for a new entry.
    pub fn resolve(
        &self,
        req: &PathRequest<'_>,
        hash: &CacheHash,
        id: &CacheId,
    ) -> Result<ResolvedPaths> {
        let content = self.content_paths(req)?;
        let data_folders = content.iter().map(|p| self.data_folder(p)).collect();
        Ok(ResolvedPaths {
            content,
            by_hash: self.hash_ref_path(hash),
            by_id: self.id_ref_path(id),
            data_folders,
        })
    }

    /// Child-data folder belonging to a content path: the path without its
    /// extension, plus `/data`.
    pub fn data_folder(&self, content_path: &str) -> String {
        let (dir, file) = match content_path.rsplit_once('/') {
            Some((dir, file)) => (Some(dir), file),
            None => (None, content_path),
        };
        let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem);
        match dir {
            Some(dir) => format!("{dir}/{stem}/{DATA_FOLDER}"),
            None => format!("{stem}/{DATA_FOLDER}"),
        }
    }

    /// Path of one child file inside a data folder.
    pub fn data_file_path(
        &self,
        folder: &str,
        data_key: Option<&str>,
        data_file_id: &str,
        data_type: DataType,
    ) -> String {
        let file_name = format!("{data_file_id}.{}", data_type.extension());
        match data_key {
            Some(key) if !key.is_empty() => format!("{folder}/{key}/{file_name}"),
            _ => format!("{folder}/{file_name}"),
        }
    }
}

fn check_component(kind: &'static str, name: &str, component: &str) -> Result<()> {
    let invalid = |reason: String| RefError::InvalidName {
        kind,
        name: name.to_string(),
        reason,
    };
    if component.is_empty() {
        return Err(invalid("components must not be empty".into()));
    }
    if component.starts_with('.') {
        return Err(invalid(format!("component must not start with '.': {component:?}")));
    }
    if let Some(ch) = component
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(invalid(format!("contains forbidden character: {ch:?}")));
    }
    Ok(())
}

/// Validate a hierarchical cache key or data key (`"reports/2024/q1"`).
///
/// # Examples
///
/// ```
/// use cask_refs::validate_cache_key;
///
/// assert!(validate_cache_key("reports/2024").is_ok());
/// assert!(validate_cache_key("").is_err());
/// assert!(validate_cache_key("a/../b").is_err());
/// ```
pub fn validate_cache_key(key: &str) -> Result<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(RefError::InvalidName {
            kind: "key",
            name: key.to_string(),
            reason: format!("length must be 1..={MAX_KEY_LEN}"),
        });
    }
    key.split('/')
        .try_for_each(|component| check_component("key", key, component))
}

/// Validate a single-segment file id.
pub fn validate_file_id(file_id: &str) -> Result<()> {
    if file_id.len() > MAX_FILE_ID_LEN {
        return Err(RefError::InvalidName {
            kind: "file id",
            name: file_id.to_string(),
            reason: format!("longer than {MAX_FILE_ID_LEN} characters"),
        });
    }
    check_component("file id", file_id, file_id)
}
