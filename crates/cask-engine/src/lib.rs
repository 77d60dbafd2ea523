//! Cache engine for Cask: store, retrieve, delete, child files, and zip
//! versioning over namespaced storage backends.
//!
//! Everything goes through [`CacheService`]. It owns the configuration, the
//! hash generator, and a [`NamespaceRegistry`] that lazily creates one
//! [`NamespaceHandler`] (backend plus reference index) per namespace.
//!
//! # Operations
//!
//! - **Store**: hash the payload, write content under every strategy path,
//!   upsert the by-hash reference, write the by-id reference.
//! - **Retrieve**: by id, or by hash through the latest live id.
//! - **Update**: rewrite content under the same id; a changed hash moves
//!   the entry to the new hash reference.
//! - **Delete**: best-effort, per-path report, by-id reference last.
//! - **Child files**: typed files attached under an entry's data folders.
//! - **Zip versioning**: copy-on-write batch edits of stored archives.
//!
//! # Modules
//!
//! - [`config`] — [`EngineConfig`], TOML and environment loading
//! - [`error`] — [`EngineError`] and the [`ErrorKind`] taxonomy
//! - [`registry`] — backend factories and per-namespace handlers
//! - [`service`] — [`CacheService`] and namespace stats
//! - [`store`] — store requests, receipts, update in place
//! - [`retrieve`] — lookups by id and hash
//! - [`delete`] — [`DeleteReport`]
//! - [`data`] — child-file operations
//! - [`archive`] — in-memory [`ZipContents`]
//! - [`versioning`] — zip batch edits
//! - [`encoding`] — gzip content encoding

pub mod archive;
pub mod config;
pub mod data;
pub mod delete;
pub mod encoding;
pub mod error;
pub mod registry;
pub mod retrieve;
pub mod service;
pub mod store;
pub mod versioning;

pub use archive::ZipContents;
pub use config::{EngineConfig, NamespaceConfig, StorageMode};
pub use data::{
    DataDeleteReport, DataFileAddress, DataFileInfo, DataFileListing, DataFileReceipt,
    RetrievedDataFile,
};
pub use delete::{DeleteReport, DeleteStatus};
pub use encoding::{gunzip, gzip};
pub use error::{EngineError, EngineResult, ErrorKind};
pub use registry::{disk_factory, memory_factory, BackendFactory, NamespaceHandler, NamespaceRegistry};
pub use retrieve::RetrievedEntry;
pub use service::{CacheService, NamespaceStats};
pub use store::{StoreReceipt, StoreRequest};
pub use versioning::{
    BatchReport, BatchRequest, BatchState, OperationResult, ZipAction, ZipCondition, ZipFileInfo,
    ZipListing, ZipOperation, ZipOperationResult, ZipStoreReceipt,
};
