//! File-backed artifact storage.
//!
//! Each artifact is one JSON file `<dir>/<name>.json`. Writes go to a
//! temporary file that is then renamed over the target, so readers see
//! either the old or the new blob.

use crate::domain::errors::{ForecastError, ForecastResult};
use crate::domain::repositories::ArtifactStore;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    /// Opens (and creates if needed) the artifact directory.
    pub fn new(dir: impl Into<PathBuf>) -> ForecastResult<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                ForecastError::persistence(&dir.display().to_string(), "created", e)
            })?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

impl ArtifactStore for FileArtifactStore {
    fn read(&self, name: &str) -> ForecastResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(name)) {
            Ok(bytes) => {
                debug!("Read artifact '{}' ({} bytes)", name, bytes.len());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ForecastError::persistence(name, "read", e)),
        }
    }

    fn write(&self, name: &str, bytes: &[u8]) -> ForecastResult<()> {
        let path = self.path_for(name);

        // Atomic write: write to temp file then rename
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, bytes).map_err(|e| ForecastError::persistence(name, "written", e))?;
        fs::rename(&temp_path, &path).map_err(|e| {
            fs::remove_file(&temp_path).ok();
            ForecastError::persistence(name, "written", e)
        })?;

        info!("Saved artifact '{}' to {:?}", name, path);
        Ok(())
    }

    fn remove(&self, name: &str) -> ForecastResult<bool> {
        match fs::remove_file(self.path_for(name)) {
            Ok(()) => {
                info!("Removed artifact '{}'", name);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ForecastError::persistence(name, "removed", e)),
        }
    }

    fn exists(&self, name: &str) -> ForecastResult<bool> {
        Ok(self.path_for(name).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn create_test_store() -> (FileArtifactStore, PathBuf) {
        let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let temp_dir = std::env::temp_dir().join(format!(
            "goldcast_test_{}_{}_{}_artifacts",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0),
            unique_id
        ));
        let store = FileArtifactStore::new(&temp_dir).expect("Failed to create test store");
        (store, temp_dir)
    }

    fn cleanup_test_dir(temp_dir: PathBuf) {
        fs::remove_dir_all(temp_dir).ok();
    }

    #[test]
    fn test_read_missing_returns_none() {
        let (store, temp_dir) = create_test_store();
        assert!(store.read("nothing").unwrap().is_none());
        assert!(!store.exists("nothing").unwrap());
        cleanup_test_dir(temp_dir);
    }

    #[test]
    fn test_write_read_remove() {
        let (store, temp_dir) = create_test_store();

        store.write("model", b"{\"a\":1}").unwrap();
        assert!(store.exists("model").unwrap());
        assert_eq!(store.read("model").unwrap().unwrap(), b"{\"a\":1}".to_vec());

        store.write("model", b"{\"a\":2}").unwrap();
        assert_eq!(store.read("model").unwrap().unwrap(), b"{\"a\":2}".to_vec());
        assert!(!store.path_for("model").with_extension("json.tmp").exists());

        assert!(store.remove("model").unwrap());
        assert!(!store.remove("model").unwrap());
        assert!(store.read("model").unwrap().is_none());

        cleanup_test_dir(temp_dir);
    }
}
