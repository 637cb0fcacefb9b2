//! File-backed JSON persistence shared by the catalog and the history archive
//!
//! Each store is one JSON document under the data directory. Writers take an
//! exclusive lock on a sibling `.lock` file and replace the document
//! atomically, so a crash mid-write leaves the previous version intact.

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_TIMEOUT_SECS: u64 = 5;
const LOCK_RETRY_MS: u64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("store I/O failed at {path}: {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to (de)serialize {path}: {source}", path = path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("timed out waiting for store lock ({0}s)")]
    LockTimeout(u64),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Held for the duration of a read-modify-write cycle
struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// One JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or `T::default()` if it does not exist yet
    pub fn load<T>(&self) -> StoreResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|source| StoreError::Serialization {
            path: self.path.clone(),
            source,
        })
    }

    /// Load, apply `mutate`, and write back under an exclusive lock.
    pub fn update<T, R>(&self, mutate: impl FnOnce(&mut T) -> StoreResult<R>) -> StoreResult<R>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let _lock = self.lock()?;
        let mut value: T = self.load()?;
        let out = mutate(&mut value)?;
        let content =
            serde_json::to_string_pretty(&value).map_err(|source| StoreError::Serialization {
                path: self.path.clone(),
                source,
            })?;
        write_atomic(&self.path, &content).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(out)
    }

    fn lock(&self) -> StoreResult<StoreLock> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }

        let lock_path = self.path.with_extension("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(io_err)?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => break,
                Err(err) => {
                    if err.kind() != ErrorKind::WouldBlock {
                        return Err(io_err(err));
                    }
                    if start.elapsed() >= Duration::from_secs(LOCK_TIMEOUT_SECS) {
                        return Err(StoreError::LockTimeout(LOCK_TIMEOUT_SECS));
                    }
                    std::thread::sleep(Duration::from_millis(LOCK_RETRY_MS));
                }
            }
        }

        Ok(StoreLock { file })
    }
}

/// Replace `path` with `content` through a sibling temp file and a rename.
pub(crate) fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)?;
    restrict_permissions(&tmp_path);

    let replaced = replace_file(&tmp_path, path);
    if replaced.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    replaced
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

#[cfg(not(windows))]
fn replace_file(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::rename(from, to)
}

/// Windows will not rename onto an existing file; the old one is parked as
/// `.bak` until the new one is in place.
#[cfg(windows)]
fn replace_file(from: &Path, to: &Path) -> std::io::Result<()> {
    let backup = to.with_extension("bak");
    let _ = fs::remove_file(&backup);
    let had_previous = to.exists();
    if had_previous {
        fs::rename(to, &backup)?;
    }
    match fs::rename(from, to) {
        Ok(()) => {
            let _ = fs::remove_file(&backup);
            Ok(())
        }
        Err(err) => {
            if had_previous {
                let _ = fs::rename(&backup, to);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_document_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("none.json"));
        let value: BTreeMap<String, u32> = store.load().unwrap();
        assert!(value.is_empty());
    }

    #[test]
    fn test_update_persists_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.json");
        let store = JsonFileStore::new(&path);

        let count = store
            .update(|map: &mut BTreeMap<String, u32>| {
                map.insert("a".into(), 1);
                Ok(map.len())
            })
            .unwrap();
        assert_eq!(count, 1);

        let loaded: BTreeMap<String, u32> = store.load().unwrap();
        assert_eq!(loaded.get("a"), Some(&1));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_failed_mutation_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("doc.json"));
        let err = store
            .update(|_: &mut BTreeMap<String, u32>| -> StoreResult<()> {
                Err(StoreError::NotFound("x".into()))
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "{not json").unwrap();
        let store = JsonFileStore::new(&path);
        let err = store.load::<BTreeMap<String, u32>>().unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }

    #[test]
    fn test_write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        fs::write(&path, "old").unwrap();
        write_atomic(&path, "new").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(!path.with_extension("tmp").exists());
        assert!(!path.with_extension("bak").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_write_atomic_into_missing_dir_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("doc.json");
        assert!(write_atomic(&path, "x").is_err());
        assert!(!path.exists());
    }
}
