//! Lookup by id and by hash.
//!
//! Absence is never an error here: every lookup returns `Ok(None)` or
//! `Ok(false)` for an unknown id or hash. The data type is always taken from
//! the IdReference, never sniffed from the stored bytes.

use cask_refs::sidecar::read_metadata;
use cask_refs::{EntryMetadata, FileMetadata, HashReference, IdReference};
use cask_types::{CacheHash, CacheId, ContentEncoding, DataType, Namespace, Payload};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::encoding::gunzip;
use crate::error::{EngineError, EngineResult};
use crate::registry::NamespaceHandler;
use crate::service::CacheService;

/// A stored value read back from the cache.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetrievedEntry {
    pub cache_id: CacheId,
    pub cache_hash: CacheHash,
    pub namespace: Namespace,
    /// Decoded payload. Gzip bodies are already decompressed.
    pub data: Payload,
    pub data_type: DataType,
    /// Encoding of the stored bytes, reported even though `data` is decoded.
    pub content_encoding: Option<ContentEncoding>,
    pub metadata: Option<EntryMetadata>,
    pub content_path: String,
    /// Size of the stored bytes.
    pub size: u64,
}

impl RetrievedEntry {
    /// Borrow the payload if it has the `expected` type.
    pub fn expect_type(&self, expected: DataType) -> EngineResult<&Payload> {
        if self.data_type == expected {
            Ok(&self.data)
        } else {
            Err(EngineError::UnsupportedMediaType {
                expected,
                stored: self.data_type,
            })
        }
    }

    pub fn into_string(self) -> EngineResult<String> {
        match self.data {
            Payload::String(s) => Ok(s),
            other => Err(mismatch(DataType::String, &other)),
        }
    }

    pub fn into_json(self) -> EngineResult<Value> {
        match self.data {
            Payload::Json(v) => Ok(v),
            other => Err(mismatch(DataType::Json, &other)),
        }
    }

    pub fn into_bytes(self) -> EngineResult<Vec<u8>> {
        match self.data {
            Payload::Binary(b) => Ok(b),
            other => Err(mismatch(DataType::Binary, &other)),
        }
    }
}

fn mismatch(expected: DataType, found: &Payload) -> EngineError {
    EngineError::UnsupportedMediaType {
        expected,
        stored: found.data_type(),
    }
}

impl CacheService {
    // ---- Retrieve ----

    pub fn retrieve_by_id(&self, cache_id: &CacheId, namespace: &Namespace) -> EngineResult<Option<RetrievedEntry>> {
        let handler = self.handler(namespace)?;
        match handler.refs().read_id_ref(cache_id)? {
            Some(id_ref) => read_entry(&handler, &id_ref),
            None => {
                debug!(namespace = %namespace, cache_id = %cache_id, "id not found");
                Ok(None)
            }
        }
    }

    /// Retrieve the newest entry still carrying `cache_hash`.
    pub fn retrieve_by_hash(&self, cache_hash: &CacheHash, namespace: &Namespace) -> EngineResult<Option<RetrievedEntry>> {
        let handler = self.handler(namespace)?;
        match handler.refs().resolve_latest(cache_hash)? {
            Some(id_ref) => read_entry(&handler, &id_ref),
            None => {
                debug!(namespace = %namespace, cache_hash = %cache_hash, "hash not found");
                Ok(None)
            }
        }
    }

    // ---- Existence and references ----

    pub fn exists_by_id(&self, cache_id: &CacheId, namespace: &Namespace) -> EngineResult<bool> {
        Ok(self.entry_refs(cache_id, namespace)?.is_some())
    }

    pub fn exists_by_hash(&self, cache_hash: &CacheHash, namespace: &Namespace) -> EngineResult<bool> {
        let handler = self.handler(namespace)?;
        Ok(handler.refs().resolve_latest(cache_hash)?.is_some())
    }

    /// The IdReference of `cache_id`.
    pub fn entry_refs(&self, cache_id: &CacheId, namespace: &Namespace) -> EngineResult<Option<IdReference>> {
        let handler = self.handler(namespace)?;
        Ok(handler.refs().read_id_ref(cache_id)?)
    }

    /// The HashReference of `cache_hash`.
    pub fn hash_refs(&self, cache_hash: &CacheHash, namespace: &Namespace) -> EngineResult<Option<HashReference>> {
        let handler = self.handler(namespace)?;
        Ok(handler.refs().read_hash_ref(cache_hash)?)
    }

    /// The `.metadata` sidecar of an entry's first content file.
    pub fn entry_metadata(&self, cache_id: &CacheId, namespace: &Namespace) -> EngineResult<Option<FileMetadata>> {
        let handler = self.handler(namespace)?;
        let Some(id_ref) = handler.refs().read_id_ref(cache_id)? else {
            return Ok(None);
        };
        match id_ref.content_paths.first() {
            Some(path) => Ok(read_metadata(handler.backend(), path)?),
            None => Ok(None),
        }
    }

    pub fn list_ids(&self, namespace: &Namespace) -> EngineResult<Vec<CacheId>> {
        Ok(self.handler(namespace)?.refs().list_ids()?)
    }

    pub fn list_hashes(&self, namespace: &Namespace) -> EngineResult<Vec<CacheHash>> {
        Ok(self.handler(namespace)?.refs().list_hashes()?)
    }
}

/// Read the content of an entry from its first readable content path.
pub(crate) fn read_entry(handler: &NamespaceHandler, id_ref: &IdReference) -> EngineResult<Option<RetrievedEntry>> {
    let backend = handler.backend();
    let found = id_ref
        .content_paths
        .iter()
        .map(|path| backend.get(path).map(|bytes| bytes.map(|b| (path, b))))
        .find_map(|result| result.transpose());
    let (path, stored) = match found {
        Some(result) => result?,
        None => {
            warn!(
                namespace = %handler.namespace(),
                cache_id = %id_ref.cache_id,
                "id reference points at missing content"
            );
            return Ok(None);
        }
    };

    let size = stored.len() as u64;
    let decoded = match id_ref.content_encoding {
        Some(ContentEncoding::Gzip) => gunzip(&stored).map_err(|e| {
            EngineError::Internal(format!("stored gzip body at {path} is unreadable: {e}"))
        })?,
        None => stored,
    };
    let data = Payload::from_bytes(id_ref.data_type, decoded)?;
    let metadata = read_metadata(backend, path)?.and_then(|m| m.entry);

    Ok(Some(RetrievedEntry {
        cache_id: id_ref.cache_id,
        cache_hash: id_ref.cache_hash.clone(),
        namespace: handler.namespace().clone(),
        data,
        data_type: id_ref.data_type,
        content_encoding: id_ref.content_encoding,
        metadata,
        content_path: path.clone(),
        size,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::gzip;
    use crate::store::StoreRequest;
    use cask_types::Strategy;
    use proptest::prelude::*;
    use serde_json::json;

    fn ns(name: &str) -> Namespace {
        Namespace::new(name).unwrap()
    }

    #[test]
    fn retrieve_by_id_returns_payload_and_metadata() {
        let service = CacheService::in_memory();
        let receipt = service.store_string("hello", &ns("ns1"), Strategy::Direct).unwrap();
        let entry = service.retrieve_by_id(&receipt.cache_id, &ns("ns1")).unwrap().unwrap();
        assert_eq!(entry.data, Payload::from("hello"));
        assert_eq!(entry.data_type, DataType::String);
        assert_eq!(entry.size, 5);
        assert_eq!(entry.content_encoding, None);
        let metadata = entry.metadata.unwrap();
        assert_eq!(metadata.cache_hash, receipt.cache_hash);
        assert_eq!(metadata.ttl_hours, 24);
        assert_eq!(metadata.strategy, Strategy::Direct);
    }

    #[test]
    fn missing_entries_are_none() {
        let service = CacheService::in_memory();
        let n = ns("ns1");
        assert!(service.retrieve_by_id(&CacheId::new(), &n).unwrap().is_none());
        let hash = CacheHash::new("0011223344556677").unwrap();
        assert!(service.retrieve_by_hash(&hash, &n).unwrap().is_none());
        assert!(!service.exists_by_hash(&hash, &n).unwrap());
        assert!(service.entry_metadata(&CacheId::new(), &n).unwrap().is_none());
    }

    #[test]
    fn retrieve_by_hash_prefers_latest() {
        let service = CacheService::in_memory();
        let n = ns("ns1");
        let first = service.store_json(json!({"k": 1}), &n, Strategy::Direct).unwrap();
        let second = service.store_json(json!({"k": 1}), &n, Strategy::Temporal).unwrap();
        let entry = service.retrieve_by_hash(&first.cache_hash, &n).unwrap().unwrap();
        assert_eq!(entry.cache_id, second.cache_id);
        assert_eq!(entry.into_json().unwrap(), json!({"k": 1}));
    }

    #[test]
    fn retrieve_by_hash_falls_back_after_delete() {
        let service = CacheService::in_memory();
        let n = ns("ns1");
        let first = service.store_string("x", &n, Strategy::Direct).unwrap();
        let second = service.store_string("x", &n, Strategy::Direct).unwrap();
        service.delete_by_id(&second.cache_id, &n).unwrap();
        let entry = service.retrieve_by_hash(&first.cache_hash, &n).unwrap().unwrap();
        assert_eq!(entry.cache_id, first.cache_id);
    }

    #[test]
    fn gzip_is_decoded_on_read() {
        let service = CacheService::in_memory();
        let plain = b"\x00\x01binary\xffdata".to_vec();
        let receipt = service
            .store(
                StoreRequest::binary(gzip(&plain).unwrap())
                    .with_content_encoding(ContentEncoding::Gzip),
            )
            .unwrap();
        let entry = service
            .retrieve_by_id(&receipt.cache_id, &Namespace::default())
            .unwrap()
            .unwrap();
        assert_eq!(entry.content_encoding, Some(ContentEncoding::Gzip));
        assert_eq!(entry.size, receipt.size);
        assert_eq!(entry.into_bytes().unwrap(), plain);
    }

    #[test]
    fn typed_accessors_report_mismatch() {
        let service = CacheService::in_memory();
        let receipt = service.store_string("text", &ns("n"), Strategy::Direct).unwrap();
        let entry = service.retrieve_by_id(&receipt.cache_id, &ns("n")).unwrap().unwrap();
        assert!(entry.expect_type(DataType::String).is_ok());
        assert!(matches!(
            entry.expect_type(DataType::Json),
            Err(EngineError::UnsupportedMediaType {
                expected: DataType::Json,
                stored: DataType::String
            })
        ));
        let err = entry.into_bytes().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedMediaType);
    }

    #[test]
    fn references_and_listing() {
        let service = CacheService::in_memory();
        let n = ns("ns1");
        let a = service.store_string("a", &n, Strategy::Direct).unwrap();
        let b = service.store_string("b", &n, Strategy::KeyBased).unwrap_err();
        assert_eq!(b.kind(), crate::error::ErrorKind::InvalidInput);

        let id_ref = service.entry_refs(&a.cache_id, &n).unwrap().unwrap();
        assert_eq!(id_ref.cache_hash, a.cache_hash);
        assert_eq!(id_ref.all_paths, a.paths);
        assert_eq!(id_ref.data_folders.len(), 1);

        let hash_ref = service.hash_refs(&a.cache_hash, &n).unwrap().unwrap();
        assert_eq!(hash_ref.latest_id, a.cache_id);
        assert_eq!(service.list_ids(&n).unwrap(), vec![a.cache_id]);
        assert_eq!(service.list_hashes(&n).unwrap(), vec![a.cache_hash]);
    }

    #[test]
    fn metadata_sidecar_checksum_matches_content() {
        let service = CacheService::in_memory();
        let receipt = service.store_string("checked", &ns("n"), Strategy::Direct).unwrap();
        let meta = service.entry_metadata(&receipt.cache_id, &ns("n")).unwrap().unwrap();
        assert!(meta.matches(b"checked"));
        assert_eq!(meta.content_size, 7);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn binary_round_trip(data in proptest::collection::vec(any::<u8>(), 1..512)) {
            let service = CacheService::in_memory();
            let receipt = service.store_binary(data.clone(), &Namespace::default(), Strategy::Direct).unwrap();
            let entry = service.retrieve_by_id(&receipt.cache_id, &Namespace::default()).unwrap().unwrap();
            prop_assert_eq!(entry.into_bytes().unwrap(), data);
        }

        #[test]
        fn string_round_trip(text in "[^\\x00]{1,64}") {
            let service = CacheService::in_memory();
            let receipt = service.store_string(&text, &Namespace::default(), Strategy::TemporalLatest).unwrap();
            prop_assert_eq!(receipt.size, text.len() as u64);
            let entry = service.retrieve_by_id(&receipt.cache_id, &Namespace::default()).unwrap().unwrap();
            prop_assert_eq!(entry.into_string().unwrap(), text);
        }
    }
}
