//! Durable local key/value storage.
//!
//! Stands in for the browser-origin storage of the original deployment: a
//! single JSON file holding string keys and values, loaded on open and
//! written through on every mutation.

use aura_core::error::AuraError;
use aura_core::traits::KeyValueStorage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Open (or create) the storage file, creating parent directories as
    /// needed. A corrupt file is treated as empty rather than fatal.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuraError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AuraError::Storage(format!("failed to create data dir: {e}")))?;
        }

        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("storage: {} is corrupt, starting empty: {e}", path.display());
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &HashMap<String, String>) -> Result<(), AuraError> {
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content)
            .map_err(|e| AuraError::Storage(format!("failed to write {}: {e}", self.path.display())))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().expect("lock poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuraError> {
        let mut entries = self.entries.lock().expect("lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), AuraError> {
        let mut entries = self.entries.lock().expect("lock poisoned");
        entries.remove(key);
        self.persist(&entries)
    }
}

/// Volatile storage for tests.
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
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().expect("lock poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AuraError> {
        self.entries
            .lock()
            .expect("lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AuraError> {
        self.entries.lock().expect("lock poisoned").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set("alpha", "1").unwrap();
        storage.set("beta", "2").unwrap();
        storage.remove("alpha").unwrap();
        drop(storage);

        // Survives a reopen.
        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get("beta").as_deref(), Some("2"));
        assert!(storage.get("alpha").is_none());
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();

        let storage = FileStorage::open(&path).unwrap();
        assert!(storage.get("anything").is_none());
    }
}
