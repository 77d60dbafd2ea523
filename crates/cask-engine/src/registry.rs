use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use cask_refs::{Layout, RefIndex};
use cask_store::{InMemoryBackend, LocalDiskBackend, StorageBackend, StoreResult};
use cask_types::Namespace;
use tracing::info;

use crate::error::{EngineError, EngineResult};

/// Builds the backend for a namespace the first time it is used.
pub type BackendFactory =
    Arc<dyn Fn(&Namespace) -> StoreResult<Arc<dyn StorageBackend>> + Send + Sync>;

/// A fresh [`InMemoryBackend`] per namespace.
pub fn memory_factory() -> BackendFactory {
    Arc::new(|_ns: &Namespace| Ok(Arc::new(InMemoryBackend::new()) as Arc<dyn StorageBackend>))
}

/// A [`LocalDiskBackend`] at `{root}/{namespace}`.
pub fn disk_factory(root: impl Into<PathBuf>) -> BackendFactory {
    let root = root.into();
    Arc::new(move |ns: &Namespace| {
        let backend = LocalDiskBackend::open(root.join(ns.as_str()))?;
        Ok(Arc::new(backend) as Arc<dyn StorageBackend>)
    })
}

/// Backend, reference index, and settings for one namespace.
pub struct NamespaceHandler {
    namespace: Namespace,
    backend: Arc<dyn StorageBackend>,
    refs: RefIndex,
    ttl_hours: u32,
}

impl NamespaceHandler {
    pub fn new(
        namespace: Namespace,
        backend: Arc<dyn StorageBackend>,
        layout: Layout,
        ttl_hours: u32,
    ) -> Self {
        let refs = RefIndex::new(Arc::clone(&backend), layout);
        Self {
            namespace,
            backend,
            refs,
            ttl_hours,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub fn refs(&self) -> &RefIndex {
        &self.refs
    }

    pub fn layout(&self) -> &Layout {
        self.refs.layout()
    }

    /// Retention hint recorded on entries. Not enforced here.
    pub fn ttl_hours(&self) -> u32 {
        self.ttl_hours
    }
}

impl std::fmt::Debug for NamespaceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceHandler")
            .field("namespace", &self.namespace)
            .field("ttl_hours", &self.ttl_hours)
            .finish_non_exhaustive()
    }
}

/// Lazily populated map of namespace handlers.
///
/// Handlers are created on first access and live until the registry is
/// dropped. Lookups after creation take only a read lock.
pub struct NamespaceRegistry {
    handlers: RwLock<HashMap<Namespace, Arc<NamespaceHandler>>>,
    factory: BackendFactory,
    layout: Layout,
    ttl_for: Box<dyn Fn(&Namespace) -> u32 + Send + Sync>,
}

impl NamespaceRegistry {
    pub fn new(
        factory: BackendFactory,
        layout: Layout,
        ttl_for: impl Fn(&Namespace) -> u32 + Send + Sync + 'static,
    ) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            factory,
            layout,
            ttl_for: Box::new(ttl_for),
        }
    }

    /// Get the handler for `namespace`, creating it on first use.
    pub fn handler(&self, namespace: &Namespace) -> EngineResult<Arc<NamespaceHandler>> {
        if let Some(existing) = self.get(namespace)? {
            return Ok(existing);
        }
        let mut handlers = self
            .handlers
            .write()
            .map_err(|e| EngineError::Internal(format!("registry lock poisoned: {e}")))?;
        // Another caller may have won the race between the two locks.
        if let Some(existing) = handlers.get(namespace) {
            return Ok(Arc::clone(existing));
        }
        let backend = (self.factory)(namespace)?;
        let ttl_hours = (self.ttl_for)(namespace);
        let handler = Arc::new(NamespaceHandler::new(
            namespace.clone(),
            backend,
            self.layout,
            ttl_hours,
        ));
        handlers.insert(namespace.clone(), Arc::clone(&handler));
        info!(namespace = %namespace, ttl_hours, "created namespace handler");
        Ok(handler)
    }

    /// The handler for `namespace` if it has already been created.
    pub fn get(&self, namespace: &Namespace) -> EngineResult<Option<Arc<NamespaceHandler>>> {
        let handlers = self
            .handlers
            .read()
            .map_err(|e| EngineError::Internal(format!("registry lock poisoned: {e}")))?;
        Ok(handlers.get(namespace).cloned())
    }

    /// Namespaces with a live handler, sorted.
    pub fn namespaces(&self) -> Vec<Namespace> {
        let mut names: Vec<Namespace> = self
            .handlers
            .read()
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl std::fmt::Debug for NamespaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceRegistry")
            .field("namespaces", &self.namespaces())
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ns(name: &str) -> Namespace {
        Namespace::new(name).unwrap()
    }

    #[test]
    fn handlers_are_created_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let factory: BackendFactory = Arc::new(move |_ns: &Namespace| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(InMemoryBackend::new()) as Arc<dyn StorageBackend>)
        });
        let registry = NamespaceRegistry::new(factory, Layout::default(), |_| 24);

        let a1 = registry.handler(&ns("a")).unwrap();
        let a2 = registry.handler(&ns("a")).unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        registry.handler(&ns("b")).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(registry.namespaces(), vec![ns("a"), ns("b")]);
    }

    #[test]
    fn get_does_not_create() {
        let registry = NamespaceRegistry::new(memory_factory(), Layout::default(), |_| 24);
        assert!(registry.get(&ns("x")).unwrap().is_none());
        assert!(registry.namespaces().is_empty());
    }

    #[test]
    fn namespaces_do_not_share_backends() {
        let registry = NamespaceRegistry::new(memory_factory(), Layout::default(), |_| 24);
        let a = registry.handler(&ns("a")).unwrap();
        let b = registry.handler(&ns("b")).unwrap();
        a.backend().put("k", b"v").unwrap();
        assert!(b.backend().get("k").unwrap().is_none());
    }

    #[test]
    fn ttl_is_resolved_per_namespace() {
        let registry = NamespaceRegistry::new(memory_factory(), Layout::default(), |ns| {
            if ns.as_str() == "long" {
                720
            } else {
                24
            }
        });
        assert_eq!(registry.handler(&ns("long")).unwrap().ttl_hours(), 720);
        assert_eq!(registry.handler(&ns("short")).unwrap().ttl_hours(), 24);
    }

    #[test]
    fn disk_factory_uses_namespace_directory() {
        let dir = tempfile::tempdir().unwrap();
        let registry = NamespaceRegistry::new(disk_factory(dir.path()), Layout::default(), |_| 24);
        let handler = registry.handler(&ns("ns1")).unwrap();
        handler.backend().put("a/b.txt", b"x").unwrap();
        assert!(dir.path().join("ns1/a/b.txt").is_file());
    }

    #[test]
    fn factory_errors_propagate() {
        let factory: BackendFactory =
            Arc::new(|_ns: &Namespace| Err(cask_store::StoreError::ReadOnly));
        let registry = NamespaceRegistry::new(factory, Layout::default(), |_| 24);
        assert!(matches!(
            registry.handler(&ns("a")),
            Err(EngineError::Store(_))
        ));
        assert!(registry.namespaces().is_empty());
    }
}
