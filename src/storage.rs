//! Device-local key-value persistence.
//!
//! The cart store and the checkout coin-selection snapshot live behind this
//! trait so the core never touches a concrete storage location directly.
//! `FileStorage` backs the real client; `MemoryStorage` backs tests and
//! embedders that manage persistence themselves.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::errors::ServiceError;

/// Durable, process-wide key-value storage.
pub trait KeyValueStorage: Send + Sync {
    /// Returns the stored value, or `None` when the key is absent.
    fn read(&self, key: &str) -> Result<Option<String>, ServiceError>;

    /// Atomically replaces the value under `key`.
    fn write(&self, key: &str, value: &str) -> Result<(), ServiceError>;

    /// Removes the key entirely. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), ServiceError>;
}

/// File-backed storage: one file per key under a data directory. Writes go
/// to a temporary file in the same directory followed by a rename, so a
/// crash never leaves a half-written payload behind.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ServiceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| ServiceError::StorageError(format!("Cannot create data dir: {}", e)))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal constants; replace separators defensively so a
        // key can never escape the data directory.
        let file_name: String = key
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

impl KeyValueStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, ServiceError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ServiceError::StorageError(format!(
                "Cannot read key {}: {}",
                key, err
            ))),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
        fs::write(&tmp, value)
            .map_err(|e| ServiceError::StorageError(format!("Cannot write key {}: {}", key, e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| ServiceError::StorageError(format!("Cannot commit key {}: {}", key, e)))
    }

    fn remove(&self, key: &str) -> Result<(), ServiceError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ServiceError::StorageError(format!(
                "Cannot remove key {}: {}",
                key, err
            ))),
        }
    }
}

/// In-memory storage for tests and embedders with their own persistence.
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ServiceError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(key);
        Ok(())
    }
}
