use std::sync::Arc;

use cask_hash::HashGenerator;
use cask_refs::Layout;
use cask_types::Namespace;
use serde::Serialize;
use tracing::info;

use crate::config::{EngineConfig, StorageMode};
use crate::error::EngineResult;
use crate::registry::{disk_factory, memory_factory, BackendFactory, NamespaceHandler, NamespaceRegistry};

/// Summary of one namespace's stored state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NamespaceStats {
    pub namespace: Namespace,
    /// Retention hint only. Nothing evicts entries.
    pub ttl_hours: u32,
    pub entry_count: usize,
    pub hash_count: usize,
    pub file_count: usize,
    pub total_bytes: u64,
}

/// The cache engine.
///
/// Owns the namespace registry and the hash generator. Store, retrieve,
/// delete, child-file, and zip operations are implemented on this type in
/// their own modules.
pub struct CacheService {
    config: EngineConfig,
    hasher: HashGenerator,
    registry: NamespaceRegistry,
}

impl CacheService {
    /// Build a service whose backends follow `config.storage_mode`.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let factory = match config.storage_mode {
            StorageMode::Memory => memory_factory(),
            StorageMode::LocalDisk => disk_factory(config.root_dir.clone()),
        };
        Self::with_backend_factory(config, factory)
    }

    /// A service with default settings and in-memory namespaces.
    pub fn in_memory() -> Self {
        let config = EngineConfig::default();
        let ttl_hours = config.default_ttl_hours;
        Self {
            hasher: HashGenerator::default(),
            registry: NamespaceRegistry::new(memory_factory(), Layout::new(config.layout), move |_| {
                ttl_hours
            }),
            config,
        }
    }

    /// Build a service with a caller-supplied backend factory.
    pub fn with_backend_factory(config: EngineConfig, factory: BackendFactory) -> EngineResult<Self> {
        config.validate()?;
        let hasher = HashGenerator::new(config.hash)?;
        let ttl_config = config.clone();
        let registry = NamespaceRegistry::new(factory, Layout::new(config.layout), move |ns| {
            ttl_config.ttl_hours(ns)
        });
        info!(
            storage_mode = ?config.storage_mode,
            algorithm = %config.hash.algorithm,
            hash_length = config.hash.length,
            "cache service ready"
        );
        Ok(Self {
            config,
            hasher,
            registry,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hasher(&self) -> &HashGenerator {
        &self.hasher
    }

    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// Namespaces touched so far by this service.
    pub fn namespaces(&self) -> Vec<Namespace> {
        self.registry.namespaces()
    }

    pub(crate) fn handler(&self, namespace: &Namespace) -> EngineResult<Arc<NamespaceHandler>> {
        self.registry.handler(namespace)
    }

    // ---- Stats ----

    /// Count entries, hashes, and stored files in `namespace`.
    pub fn namespace_stats(&self, namespace: &Namespace) -> EngineResult<NamespaceStats> {
        let handler = self.handler(namespace)?;
        let entry_count = handler.refs().list_ids()?.len();
        let hash_count = handler.refs().list_hashes()?.len();
        let backend = handler.backend();
        let files = backend.list("")?;
        let mut total_bytes = 0u64;
        for path in &files {
            if let Some(bytes) = backend.get(path)? {
                total_bytes += bytes.len() as u64;
            }
        }
        Ok(NamespaceStats {
            namespace: namespace.clone(),
            ttl_hours: handler.ttl_hours(),
            entry_count,
            hash_count,
            file_count: files.len(),
            total_bytes,
        })
    }
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("storage_mode", &self.config.storage_mode)
            .field("hasher", &self.hasher)
            .field("registry", &self.registry)
            .finish()
    }
}
