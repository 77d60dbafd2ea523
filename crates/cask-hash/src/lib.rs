//! Content hashing for the Cask cache.
//!
//! The [`HashGenerator`] turns strings, JSON values, and raw bytes into a
//! [`CacheHash`](cask_types::CacheHash): the lowercase hex digest of the
//! configured algorithm, truncated to a configured length so it stays short
//! enough to shard paths on.
//!
//! JSON is canonicalized before hashing (object keys sorted at every depth,
//! compact separators), so two documents that differ only in key order
//! produce the same hash.
//!
//! Hashing is pure. The only failure modes are an invalid configuration and
//! a JSON field path that does not resolve.

pub mod algorithm;
pub mod canonical;
pub mod error;
pub mod generator;

pub use algorithm::{ContentDigest, HashAlgorithm};
pub use canonical::{canonical_json, extract_field};
pub use error::{HashError, HashResult};
pub use generator::{HashConfig, HashGenerator};
