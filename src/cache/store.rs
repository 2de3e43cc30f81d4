//! On-disk cache store: one JSON file per cached path.
//!
//! File names are the sha256 of the cached path, so arbitrary paths map to
//! flat, collision-free names. Corrupt or unreadable files are skipped.

use super::entry::{content_hash, CacheEntry};
use crate::errors::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            Error::Cache(format!(
                "Failed to create cache directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, file_path: &str) -> PathBuf {
        self.dir.join(format!("{}.json", content_hash(file_path)))
    }

    /// Load every readable entry
    pub fn load_all(&self) -> Vec<CacheEntry> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to read cache directory");
                return Vec::new();
            }
        };

        read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| match Self::read_entry(&path) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                    None
                }
            })
            .collect()
    }

    fn read_entry(path: &Path) -> Result<CacheEntry> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn write(&self, entry: &CacheEntry) -> Result<()> {
        let path = self.entry_path(&entry.file_path);
        let data = serde_json::to_vec_pretty(entry)?;
        // Write to a sibling file first so readers never see a partial entry.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    pub fn remove(&self, file_path: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(file_path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn clear(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)?.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}
