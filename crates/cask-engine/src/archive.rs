//! In-memory zip archives.
//!
//! An archive is extracted into a sorted map of file path to bytes, edited
//! there, and written back as a fresh zip. Directory entries are dropped on
//! extraction; they reappear implicitly from file paths.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use cask_hash::HashGenerator;
use cask_types::CacheHash;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{EngineError, EngineResult};

/// The files of a zip archive, keyed by path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ZipContents {
    files: BTreeMap<String, Vec<u8>>,
}

impl ZipContents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract every file of a zip archive.
    pub fn from_bytes(bytes: &[u8]) -> EngineResult<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| EngineError::Archive(format!("not a zip archive: {e}")))?;
        let mut files = BTreeMap::new();
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| EngineError::Archive(format!("entry {index}: {e}")))?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut content = Vec::with_capacity(capacity_hint(file.size(), bytes.len()));
            file.read_to_end(&mut content)
                .map_err(|e| EngineError::Archive(format!("{name}: {e}")))?;
            files.insert(name, content);
        }
        Ok(Self { files })
    }

    /// Write the files as a deflated zip archive, in path order.
    pub fn to_bytes(&self) -> EngineResult<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, content) in &self.files {
            writer
                .start_file(name.as_str(), options)
                .map_err(|e| EngineError::Archive(format!("{name}: {e}")))?;
            writer
                .write_all(content)
                .map_err(|e| EngineError::Archive(format!("{name}: {e}")))?;
        }
        let cursor = writer
            .finish()
            .map_err(|e| EngineError::Archive(e.to_string()))?;
        Ok(cursor.into_inner())
    }

    /// Hash of the archive's contents, independent of compression and
    /// entry order: every `path \0 content \0` record, in path order.
    pub fn content_hash(&self, hasher: &HashGenerator) -> CacheHash {
        let mut digest = hasher.digest();
        for (name, content) in &self.files {
            digest.update(name.as_bytes());
            digest.update(b"\0");
            digest.update(content);
            digest.update(b"\0");
        }
        hasher.finish(digest)
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Insert or overwrite a file. Returns `true` if it replaced one.
    pub fn insert(&mut self, path: impl Into<String>, content: Vec<u8>) -> bool {
        self.files.insert(path.into(), content).is_some()
    }

    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        self.files.remove(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.files.values().map(|c| c.len() as u64).sum()
    }
}

impl FromIterator<(String, Vec<u8>)> for ZipContents {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// Preallocation for an extracted file. The declared size comes from the
/// archive header and is capped relative to the archive's own length.
fn capacity_hint(declared: u64, archive_len: usize) -> usize {
    let cap = (archive_len as u64).saturating_mul(4);
    usize::try_from(declared.min(cap)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ZipContents {
        [
            ("a.txt".to_string(), b"alpha".to_vec()),
            ("dir/b.json".to_string(), br#"{"b":1}"#.to_vec()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn write_then_extract() {
        let contents = sample();
        let bytes = contents.to_bytes().unwrap();
        let back = ZipContents::from_bytes(&bytes).unwrap();
        assert_eq!(back, contents);
        assert_eq!(back.paths(), vec!["a.txt", "dir/b.json"]);
        assert_eq!(back.get("a.txt"), Some(&b"alpha"[..]));
        assert_eq!(back.total_size(), 5 + 7);
    }

    #[test]
    fn directory_entries_are_skipped() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.add_directory("empty/", SimpleFileOptions::default()).unwrap();
        writer.start_file("empty/x.txt", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"x").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        let contents = ZipContents::from_bytes(&bytes).unwrap();
        assert_eq!(contents.paths(), vec!["empty/x.txt"]);
    }

    #[test]
    fn declared_size_does_not_drive_allocation() {
        assert_eq!(capacity_hint(10, 100), 10);
        assert_eq!(capacity_hint(u64::MAX, 100), 400);
        assert_eq!(capacity_hint(u64::MAX, 0), 0);
        // A real archive still extracts in full past the hint.
        let big = "x".repeat(64 * 1024);
        let mut contents = ZipContents::new();
        contents.insert("big.txt", big.clone().into_bytes());
        let bytes = contents.to_bytes().unwrap();
        assert!(bytes.len() * 4 < big.len());
        let back = ZipContents::from_bytes(&bytes).unwrap();
        assert_eq!(back.get("big.txt"), Some(big.as_bytes()));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            ZipContents::from_bytes(b"PK but not really"),
            Err(EngineError::Archive(_))
        ));
    }

    #[test]
    fn content_hash_ignores_compression() {
        let hasher = HashGenerator::default();
        let contents = sample();
        let mut stored = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, content) in [("dir/b.json", &br#"{"b":1}"#[..]), ("a.txt", &b"alpha"[..])] {
            stored.start_file(name, options).unwrap();
            stored.write_all(content).unwrap();
        }
        let other = ZipContents::from_bytes(&stored.finish().unwrap().into_inner()).unwrap();
        assert_eq!(other.content_hash(&hasher), contents.content_hash(&hasher));

        let mut changed = contents.clone();
        changed.insert("a.txt", b"beta".to_vec());
        assert_ne!(changed.content_hash(&hasher), contents.content_hash(&hasher));
    }

    #[test]
    fn insert_and_remove() {
        let mut contents = ZipContents::new();
        assert!(!contents.insert("x", b"1".to_vec()));
        assert!(contents.insert("x", b"2".to_vec()));
        assert_eq!(contents.remove("x"), Some(b"2".to_vec()));
        assert!(contents.is_empty());
    }
}
