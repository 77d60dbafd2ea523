//! Store and in-place update.
//!
//! A store runs in a fixed order:
//!
//! 1. Resolve every path from the strategy, and find the entry a caller
//!    chosen file id already names.
//! 2. Write the content files with their sidecars.
//! 3. Append the id to the HashReference.
//! 4. Write the IdReference.
//!
//! The hash is the explicit one if given, else the hash of the cache key,
//! else the hash of the JSON field path value, else the hash of the payload.
//!
//! A failure in step 2 aborts with nothing left behind. A failure in step 3
//! is logged and the store continues: the IdReference is the canonical
//! address of an entry, and hash lookup is best-effort.

use cask_refs::{
    sidecar_paths, write_file_set, EntryMetadata, EntryPaths, HashRelease, IdReference, PathRequest,
};
use cask_types::{CacheHash, CacheId, ContentEncoding, DataType, Namespace, Payload, Strategy};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::encoding::gunzip;
use crate::error::{EngineError, EngineResult};
use crate::registry::NamespaceHandler;
use crate::service::CacheService;

/// Everything needed to store one value.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreRequest {
    pub payload: Payload,
    pub strategy: Strategy,
    pub namespace: Namespace,
    pub cache_key: Option<String>,
    pub file_id: Option<String>,
    /// Use this hash instead of deriving one from the payload.
    pub cache_hash: Option<CacheHash>,
    /// Hash only this dot path of a JSON payload.
    pub json_field_path: Option<String>,
    pub content_encoding: Option<ContentEncoding>,
}

impl StoreRequest {
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            payload: payload.into(),
            strategy: Strategy::default(),
            namespace: Namespace::default(),
            cache_key: None,
            file_id: None,
            cache_hash: None,
            json_field_path: None,
            content_encoding: None,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(Payload::String(value.into()))
    }

    pub fn json(value: Value) -> Self {
        Self::new(Payload::Json(value))
    }

    pub fn binary(value: impl Into<Vec<u8>>) -> Self {
        Self::new(Payload::Binary(value.into()))
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn in_namespace(mut self, namespace: Namespace) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    pub fn with_cache_hash(mut self, hash: CacheHash) -> Self {
        self.cache_hash = Some(hash);
        self
    }

    pub fn with_json_field_path(mut self, path: impl Into<String>) -> Self {
        self.json_field_path = Some(path.into());
        self
    }

    pub fn with_content_encoding(mut self, encoding: ContentEncoding) -> Self {
        self.content_encoding = Some(encoding);
        self
    }

    fn validate(&self) -> EngineResult<()> {
        if self.payload.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "{} payload must not be empty",
                self.payload.data_type()
            )));
        }
        if self.content_encoding.is_some() && self.payload.data_type() != DataType::Binary {
            return Err(EngineError::InvalidInput(
                "content encoding applies to binary payloads only".into(),
            ));
        }
        if self.json_field_path.is_some() && self.payload.data_type() != DataType::Json {
            return Err(EngineError::InvalidInput(
                "json_field_path applies to JSON payloads only".into(),
            ));
        }
        Ok(())
    }
}

/// Result of a successful store or update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreReceipt {
    pub cache_id: CacheId,
    pub cache_hash: CacheHash,
    pub namespace: Namespace,
    pub strategy: Strategy,
    pub data_type: DataType,
    pub paths: EntryPaths,
    /// Size of the stored bytes, after serialization and before any decoding.
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

impl CacheService {
    // ---- Store ----

    /// Store a value.
    ///
    /// Without a `file_id` every store creates a fresh cache id. A caller
    /// chosen `file_id` names one entry: when a live entry already owns the
    /// resolved content path, the store rewrites that entry under its id.
    /// Secondary paths it shares with other entries (the `latest/` copy)
    /// move to the entry written last.
    pub fn store(&self, request: StoreRequest) -> EngineResult<StoreReceipt> {
        self.store_at(request, Utc::now())
    }

    pub(crate) fn store_at(&self, request: StoreRequest, stored_at: DateTime<Utc>) -> EngineResult<StoreReceipt> {
        request.validate()?;
        let handler = self.handler(&request.namespace)?;
        let bytes = request.payload.to_bytes()?;
        let cache_hash = self.derive_hash(&request, &bytes)?;
        let fresh_id = CacheId::new();
        let file_id = request
            .file_id
            .clone()
            .unwrap_or_else(|| fresh_id.to_string());
        let data_type = request.payload.data_type();

        let layout = handler.layout();
        let version = if request.strategy == Strategy::TemporalVersioned {
            let existing = handler.backend().list(&layout.versions_prefix())?;
            layout.next_version(&existing, &file_id, data_type)
        } else {
            1
        };
        let mut resolved = layout.resolve(
            &PathRequest {
                strategy: request.strategy,
                file_id: &file_id,
                cache_key: request.cache_key.as_deref(),
                data_type,
                timestamp: stored_at,
                version,
            },
            &cache_hash,
            &fresh_id,
        )?;

        let previous = match (&request.file_id, resolved.content.first()) {
            (Some(_), Some(primary)) => content_owner(&handler, primary)?,
            _ => None,
        };
        let cache_id = previous.as_ref().map_or(fresh_id, |p| p.cache_id);
        if previous.is_some() {
            resolved.by_id = layout.id_ref_path(&cache_id);
        }
        let mut displaced = Vec::new();
        for path in resolved.content.iter().skip(1) {
            if let Some(owner) = content_owner(&handler, path)? {
                if owner.cache_id != cache_id {
                    displaced.push((path.clone(), owner));
                }
            }
        }

        let metadata = EntryMetadata {
            cache_id,
            cache_hash: cache_hash.clone(),
            cache_key: request.cache_key.clone(),
            file_id: file_id.clone(),
            namespace: request.namespace.clone(),
            strategy: request.strategy,
            data_type,
            content_encoding: request.content_encoding,
            json_field_path: request.json_field_path.clone(),
            ttl_hours: handler.ttl_hours(),
            stored_at,
            updated_at: None,
        };
        let mut data_paths = write_content(&handler, &resolved.content, &bytes, &file_id, stored_at, &metadata)?;
        for (path, owner) in displaced {
            detach_path(&handler, owner, &path, &cache_id)?;
        }

        let by_hash = match handler.refs().upsert_hash_ref(&cache_hash, &cache_id, stored_at) {
            Ok((_, written)) => written,
            Err(e) => {
                warn!(
                    namespace = %request.namespace,
                    cache_id = %cache_id,
                    cache_hash = %cache_hash,
                    error = %e,
                    "hash reference upsert failed; entry reachable by id only"
                );
                Vec::new()
            }
        };

        let mut data_folders = resolved.data_folders;
        if let Some(prev) = &previous {
            for path in &prev.all_paths.data {
                if !data_paths.contains(path) {
                    data_paths.push(path.clone());
                }
            }
            for folder in &prev.data_folders {
                if !data_folders.contains(folder) {
                    data_folders.push(folder.clone());
                }
            }
        }
        let id_ref = IdReference {
            cache_id,
            cache_hash: cache_hash.clone(),
            namespace: request.namespace.clone(),
            strategy: request.strategy,
            data_type,
            content_encoding: request.content_encoding,
            cache_key: request.cache_key.clone(),
            file_id,
            all_paths: EntryPaths {
                data: data_paths,
                by_hash,
                by_id: sidecar_paths(&resolved.by_id).to_vec(),
            },
            content_paths: resolved.content,
            data_folders,
            timestamp: stored_at,
        };
        handler.refs().write_id_ref(&id_ref)?;

        if let Some(prev) = previous.as_ref().filter(|p| p.cache_hash != cache_hash) {
            match handler.refs().release_hash_ref(&prev.cache_hash, &cache_id)? {
                HashRelease::Removed { failed, .. } if !failed.is_empty() => {
                    warn!(cache_hash = %prev.cache_hash, failed = failed.len(), "old hash reference only partly removed");
                }
                outcome => debug!(cache_hash = %prev.cache_hash, ?outcome, "released old hash"),
            }
        }

        info!(
            namespace = %request.namespace,
            cache_id = %cache_id,
            cache_hash = %cache_hash,
            strategy = %request.strategy,
            data_type = %data_type,
            size = bytes.len(),
            restored = previous.is_some(),
            "stored entry"
        );
        Ok(StoreReceipt {
            cache_id,
            cache_hash,
            namespace: request.namespace,
            strategy: request.strategy,
            data_type,
            paths: id_ref.all_paths,
            size: bytes.len() as u64,
            stored_at,
        })
    }

    pub fn store_string(&self, value: &str, namespace: &Namespace, strategy: Strategy) -> EngineResult<StoreReceipt> {
        self.store(
            StoreRequest::string(value)
                .in_namespace(namespace.clone())
                .with_strategy(strategy),
        )
    }

    pub fn store_json(&self, value: Value, namespace: &Namespace, strategy: Strategy) -> EngineResult<StoreReceipt> {
        self.store(
            StoreRequest::json(value)
                .in_namespace(namespace.clone())
                .with_strategy(strategy),
        )
    }

    pub fn store_binary(&self, value: Vec<u8>, namespace: &Namespace, strategy: Strategy) -> EngineResult<StoreReceipt> {
        self.store(
            StoreRequest::binary(value)
                .in_namespace(namespace.clone())
                .with_strategy(strategy),
        )
    }

    fn derive_hash(&self, request: &StoreRequest, stored: &[u8]) -> EngineResult<CacheHash> {
        if let Some(hash) = &request.cache_hash {
            return Ok(hash.clone());
        }
        if let Some(key) = &request.cache_key {
            return Ok(self.hasher().from_string(key));
        }
        let hash = match (&request.payload, request.json_field_path.as_deref()) {
            (Payload::Json(value), Some(path)) => self.hasher().from_json_field(value, path)?,
            (Payload::Json(value), None) => self.hasher().from_json(value),
            (Payload::String(value), _) => self.hasher().from_string(value),
            (Payload::Binary(_), _) => match request.content_encoding {
                Some(ContentEncoding::Gzip) => self.hasher().from_bytes(&gunzip(stored)?),
                None => self.hasher().from_bytes(stored),
            },
        };
        Ok(hash)
    }

    // ---- Update ----

    /// Replace the payload of an existing entry, keeping its id and paths.
    ///
    /// The payload must have the stored data type. A keyed entry keeps its
    /// key-derived hash. When the new content hashes differently, the new hash is indexed, the IdReference is
    /// rewritten to carry it, and the old HashReference is released.
    /// Returns `Ok(None)` when the id does not exist.
    pub fn update_by_id(
        &self,
        cache_id: &CacheId,
        namespace: &Namespace,
        payload: Payload,
    ) -> EngineResult<Option<StoreReceipt>> {
        let handler = self.handler(namespace)?;
        let Some(mut id_ref) = handler.refs().read_id_ref(cache_id)? else {
            debug!(namespace = %namespace, cache_id = %cache_id, "update of unknown id");
            return Ok(None);
        };
        if payload.data_type() != id_ref.data_type {
            return Err(EngineError::UnsupportedMediaType {
                expected: payload.data_type(),
                stored: id_ref.data_type,
            });
        }
        if payload.is_empty() {
            return Err(EngineError::InvalidInput(format!(
                "{} payload must not be empty",
                payload.data_type()
            )));
        }

        let previous = match id_ref.content_paths.first() {
            Some(path) => cask_refs::sidecar::read_metadata(handler.backend(), path)?.and_then(|m| m.entry),
            None => None,
        };
        let json_field_path = previous.as_ref().and_then(|m| m.json_field_path.clone());
        let bytes = payload.to_bytes()?;
        let request = StoreRequest {
            cache_key: id_ref.cache_key.clone(),
            json_field_path: json_field_path.clone(),
            ..StoreRequest::new(payload)
        };
        let new_hash = self.derive_hash(&request, &bytes)?;
        let old_hash = id_ref.cache_hash.clone();
        let updated_at = Utc::now();

        let metadata = EntryMetadata {
            cache_id: *cache_id,
            cache_hash: new_hash.clone(),
            cache_key: id_ref.cache_key.clone(),
            file_id: id_ref.file_id.clone(),
            namespace: namespace.clone(),
            strategy: id_ref.strategy,
            data_type: id_ref.data_type,
            content_encoding: None,
            json_field_path,
            ttl_hours: handler.ttl_hours(),
            stored_at: previous.map_or(id_ref.timestamp, |m| m.stored_at),
            updated_at: Some(updated_at),
        };
        let data_paths = write_content(
            &handler,
            &id_ref.content_paths,
            &bytes,
            &id_ref.file_id,
            updated_at,
            &metadata,
        )?;

        let rehashed = new_hash != old_hash;
        if rehashed {
            let (_, by_hash) = handler.refs().upsert_hash_ref(&new_hash, cache_id, updated_at)?;
            id_ref.all_paths.by_hash = by_hash;
        }
        id_ref.cache_hash = new_hash.clone();
        id_ref.content_encoding = None;
        id_ref.all_paths.data = data_paths;
        handler.refs().write_id_ref(&id_ref)?;

        if rehashed {
            match handler.refs().release_hash_ref(&old_hash, cache_id)? {
                HashRelease::Removed { failed, .. } if !failed.is_empty() => {
                    warn!(cache_hash = %old_hash, failed = failed.len(), "old hash reference only partly removed");
                }
                outcome => debug!(cache_hash = %old_hash, ?outcome, "released old hash"),
            }
        }

        info!(
            namespace = %namespace,
            cache_id = %cache_id,
            cache_hash = %new_hash,
            rehashed,
            size = bytes.len(),
            "updated entry"
        );
        Ok(Some(StoreReceipt {
            cache_id: *cache_id,
            cache_hash: new_hash,
            namespace: namespace.clone(),
            strategy: id_ref.strategy,
            data_type: id_ref.data_type,
            paths: id_ref.all_paths,
            size: bytes.len() as u64,
            stored_at: updated_at,
        }))
    }
}

/// Write every content copy of an entry with its sidecars.
///
/// Failure on the first copy removes whatever part of it was written and
/// reports [`EngineError::ContentWrite`].
fn write_content(
    handler: &NamespaceHandler,
    paths: &[String],
    bytes: &[u8],
    file_id: &str,
    at: DateTime<Utc>,
    metadata: &EntryMetadata,
) -> EngineResult<Vec<String>> {
    let backend = handler.backend();
    let mut written = Vec::with_capacity(paths.len() * 3);
    for (i, path) in paths.iter().enumerate() {
        match write_file_set(backend, path, bytes, file_id, at, Some(metadata.clone())) {
            Ok(files) => written.extend(files),
            Err(source) if i == 0 => {
                for partial in sidecar_paths(path) {
                    if let Err(e) = backend.delete(&partial) {
                        warn!(path = %partial, error = %e, "cleanup after failed content write");
                    }
                }
                return Err(EngineError::ContentWrite {
                    path: path.clone(),
                    source,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(written)
}

/// The live entry whose content paths include `path`, found through the
/// path's metadata sidecar.
fn content_owner(handler: &NamespaceHandler, path: &str) -> EngineResult<Option<IdReference>> {
    let Some(entry) = cask_refs::sidecar::read_metadata(handler.backend(), path)?.and_then(|m| m.entry) else {
        return Ok(None);
    };
    Ok(handler
        .refs()
        .read_id_ref(&entry.cache_id)?
        .filter(|owner| owner.content_paths.iter().any(|p| p == path)))
}

/// Drop `path`, its sidecars, and its data folder from `owner`'s record.
fn detach_path(handler: &NamespaceHandler, mut owner: IdReference, path: &str, new_owner: &CacheId) -> EngineResult<()> {
    let files = sidecar_paths(path);
    let folder = handler.layout().data_folder(path);
    owner.content_paths.retain(|p| p != path);
    owner.all_paths.data.retain(|p| !files.contains(p));
    owner.data_folders.retain(|f| *f != folder);
    handler.refs().write_id_ref(&owner)?;
    debug!(path = %path, from = %owner.cache_id, to = %new_owner, "content path changed owner");
    Ok(())
}
