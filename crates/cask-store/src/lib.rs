//! Path-keyed byte storage for the Cask cache.
//!
//! The engine above this crate only ever needs four primitives from storage:
//! put bytes at a path, get them back, delete them, and list everything under
//! a prefix. Those four make up the [`StorageBackend`] trait; everything else
//! (layout, references, sidecars) is built on top of them.
//!
//! # Storage Backends
//!
//! - [`InMemoryBackend`] -- `BTreeMap`-based store for tests and embedding
//! - [`LocalDiskBackend`] -- files under a root directory
//!
//! # Design Rules
//!
//! 1. Paths are `/`-separated and relative; validation happens at the boundary.
//! 2. A missing path is `Ok(None)` / `Ok(false)`, never an error.
//! 3. `list` returns full paths, sorted.
//! 4. Backends never interpret the bytes they hold.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod disk;
pub mod error;
pub mod memory;
pub mod path;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use disk::LocalDiskBackend;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryBackend;
pub use path::{join_path, validate_path};
pub use traits::{BackendExt, StorageBackend};
