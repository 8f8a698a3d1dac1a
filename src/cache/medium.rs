//! Persistent cache media
//!
//! The expiring cache stores opaque strings through the `CacheMedium`
//! trait. `FileMedium` persists one file per key under a cache directory;
//! `MemoryMedium` backs tests and ephemeral sessions.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::io;
use std::path::PathBuf;
use tracing::warn;

/// A flat string key/value store with best-effort writes
pub trait CacheMedium: Send + Sync {
    /// Read the raw string stored under `key`, if any
    fn read(&self, key: &str) -> Option<String>;

    /// Write `value` under `key`, replacing any previous value
    fn write(&self, key: &str, value: &str) -> io::Result<()>;

    /// Remove the entry under `key` if present
    fn remove(&self, key: &str);
}

/// File-per-key medium under a cache directory
///
/// Cache keys contain verse identifiers (spaces, mixed case), so the file
/// name is the hex SHA-256 of the key rather than the key itself.
pub struct FileMedium {
    dir: PathBuf,
}

impl FileMedium {
    /// Create a medium rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(hasher.finalize())))
    }
}

impl CacheMedium for FileMedium {
    fn read(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(key)).ok()
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::write(self.path_for(key), value)
    }

    fn remove(&self, key: &str) {
        if let Err(e) = std::fs::remove_file(self.path_for(key)) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(key = key, error = %e, "Failed to remove cache file");
            }
        }
    }
}

/// In-memory medium for tests and cache-less sessions
#[derive(Default)]
pub struct MemoryMedium {
    entries: DashMap<String, String>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheMedium for MemoryMedium {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.clone())
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }
}
