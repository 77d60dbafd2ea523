//! Foundation types for Cask, a namespaced content-addressable cache.
//!
//! Every other Cask crate depends on `cask-types`. The types here are plain
//! values: they validate themselves on construction and carry no storage
//! behavior.
//!
//! # Key Types
//!
//! - [`CacheId`] — UUID v7 identifier assigned to every stored entry
//! - [`CacheHash`] — truncated hex content hash used for dedup and lookup
//! - [`Namespace`] — logical partition name
//! - [`DataType`] — payload kind (string, json, binary) and its file extension
//! - [`Strategy`] — path layout policy for content files
//! - [`ContentEncoding`] — optional transfer encoding of stored bytes
//! - [`Payload`] — a typed value handed to or returned from the engine

pub mod error;
pub mod id;
pub mod kind;
pub mod namespace;
pub mod payload;

pub use error::TypeError;
pub use id::{CacheHash, CacheId};
pub use kind::{ContentEncoding, DataType, Strategy};
pub use namespace::Namespace;
pub use payload::Payload;
