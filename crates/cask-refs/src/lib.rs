//! Path layout and reference indices for the Cask cache.
//!
//! Every cache entry is reachable two ways: by its id and by its content
//! hash. This crate owns the records that make both lookups cheap, and the
//! layout rules that decide where every file of an entry lives.
//!
//! # Architecture
//!
//! - **HashReference** (`refs/by-hash/..`) lists every cache id ever stored
//!   under one hash, oldest first, plus the latest id.
//! - **IdReference** (`refs/by-id/..`) records everything known about one id:
//!   its hash, strategy, type, and every path written for it. It is the
//!   single source of truth for delete and child-file operations.
//! - **Sidecars**: each written file gets `.config` and `.metadata` siblings.
//! - **Layout** turns a strategy plus context into concrete paths, sharding
//!   reference paths by a fixed-width prefix of the hash or id.
//!
//! # Modules
//!
//! - [`error`] — Error types for reference operations
//! - [`types`] — [`HashReference`], [`IdReference`], [`EntryMetadata`]
//! - [`layout`] — Strategy path resolution and key validation
//! - [`sidecar`] — Content files with `.config`/`.metadata` siblings
//! - [`index`] — [`RefIndex`], the read-modify-write manager over a backend

pub mod error;
pub mod index;
pub mod layout;
pub mod sidecar;
pub mod types;

pub use error::{RefError, Result};
pub use index::{HashRelease, RefIndex};
pub use layout::{
    validate_cache_key, validate_file_id, Layout, LayoutConfig, PathRequest, ResolvedPaths,
};
pub use sidecar::{sidecar_paths, write_file_set, FileConfig, FileMetadata};
pub use types::{EntryMetadata, EntryPaths, HashEntry, HashReference, IdReference};
