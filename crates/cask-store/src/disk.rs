use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::StoreResult;
use crate::path::validate_path;
use crate::traits::StorageBackend;

/// Marker in temporary file names; listing skips these files.
const TMP_MARKER: &str = ".tmp-";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Storage backend that keeps each path as a file under a root directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// reader never observes a half-written file. Parent directories are created
/// on demand and empty ones are pruned after deletes.
#[derive(Debug, Clone)]
pub struct LocalDiskBackend {
    root: PathBuf,
}

impl LocalDiskBackend {
    /// Open (or create) a backend rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "opened local disk backend");
        Ok(Self { root })
    }

    /// The root directory of this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> StoreResult<PathBuf> {
        validate_path(path)?;
        Ok(path.split('/').fold(self.root.clone(), |acc, c| acc.join(c)))
    }

    /// Remove empty directories between `start` and the root.
    fn prune_empty_dirs(&self, start: Option<&Path>) {
        let mut current = start.map(Path::to_path_buf);
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // Fails on non-empty directories, which ends the walk.
            if fs::remove_dir(&dir).is_err() {
                break;
            }
            current = dir.parent().map(Path::to_path_buf);
        }
    }
}

impl StorageBackend for LocalDiskBackend {
    fn put(&self, path: &str, data: &[u8]) -> StoreResult<()> {
        let target = self.full_path(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = {
            let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
            let mut name = target.file_name().unwrap_or_default().to_os_string();
            name.push(format!("{TMP_MARKER}{}-{n}", std::process::id()));
            target.with_file_name(name)
        };
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &target) {
            let _ = fs::remove_file(&tmp);
            warn!(path, error = %e, "failed to move file into place");
            return Err(e.into());
        }
        debug!(path, bytes = data.len(), "wrote file");
        Ok(())
    }

    fn get(&self, path: &str) -> StoreResult<Option<Vec<u8>>> {
        let target = self.full_path(path)?;
        match fs::read(&target) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) if target.is_dir() => {
                debug!(path, error = %e, "path is a directory");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, path: &str) -> StoreResult<bool> {
        let target = self.full_path(path)?;
        match fs::remove_file(&target) {
            Ok(()) => {
                self.prune_empty_dirs(target.parent());
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        // Start the walk at the deepest directory fully named by the prefix.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.full_path(dir_part)?
        };
        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&start) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) && !key.contains(TMP_MARKER) {
                paths.push(key);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.full_path(path)?.is_file())
    }
}
