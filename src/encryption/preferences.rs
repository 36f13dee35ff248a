//! Preference stores - small string key/value stores for credentials
//!
//! - `MemoryPreferences`: process-local, lost on drop
//! - `FilePreferences`: one JSON object per file, rewritten atomically
//!   (temp file, fsync, rename) on every change

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::errors::{KeyStorageError, KeyStorageResult};

pub trait PreferenceStore: Send + Sync {
    fn get_string(&self, key: &str) -> KeyStorageResult<Option<String>>;

    fn put_string(&self, key: &str, value: &str) -> KeyStorageResult<()>;

    /// Removing an absent key succeeds.
    fn remove(&self, key: &str) -> KeyStorageResult<()>;

    fn contains(&self, key: &str) -> KeyStorageResult<bool>;
}

fn lock<T>(mutex: &Mutex<T>) -> KeyStorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| KeyStorageError::LockPoisoned("preferences"))
}

#[derive(Debug, Default)]
pub struct MemoryPreferences {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get_string(&self, key: &str) -> KeyStorageResult<Option<String>> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn put_string(&self, key: &str, value: &str) -> KeyStorageResult<()> {
        lock(&self.entries)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> KeyStorageResult<()> {
        lock(&self.entries)?.remove(key);
        Ok(())
    }

    fn contains(&self, key: &str) -> KeyStorageResult<bool> {
        Ok(lock(&self.entries)?.contains_key(key))
    }
}

#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    temp_path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FilePreferences {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> KeyStorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries: BTreeMap<String, String> = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                KeyStorageError::Corrupt {
                    key: path.display().to_string(),
                    reason: e.to_string(),
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        let temp_path = path.with_extension("tmp");
        Ok(Self {
            path,
            temp_path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomic(&self, entries: &BTreeMap<String, String>) -> KeyStorageResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| KeyStorageError::InvalidKeyData(e.to_string()))?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&self.temp_path, &self.path)?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }

    /// Applies `change` to a copy, writes it, then publishes it in memory.
    fn update(&self, change: impl FnOnce(&mut BTreeMap<String, String>)) -> KeyStorageResult<()> {
        let mut entries = lock(&self.entries)?;
        let mut next = entries.clone();
        change(&mut next);
        self.write_atomic(&next)?;
        *entries = next;
        Ok(())
    }
}

impl PreferenceStore for FilePreferences {
    fn get_string(&self, key: &str) -> KeyStorageResult<Option<String>> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn put_string(&self, key: &str, value: &str) -> KeyStorageResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> KeyStorageResult<()> {
        if !self.contains(key)? {
            return Ok(());
        }
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn contains(&self, key: &str) -> KeyStorageResult<bool> {
        Ok(lock(&self.entries)?.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store() {
        let store = MemoryPreferences::new();
        assert!(!store.contains("a").unwrap());
        store.put_string("a", "1").unwrap();
        assert_eq!(store.get_string("a").unwrap().as_deref(), Some("1"));
        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.get_string("a").unwrap().is_none());
    }

    #[test]
    fn test_file_store_persists_across_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        {
            let store = FilePreferences::open(&path).unwrap();
            store.put_string("a", "1").unwrap();
            store.put_string("b", "2").unwrap();
            store.remove("b").unwrap();
        }
        let reopened = FilePreferences::open(&path).unwrap();
        assert_eq!(reopened.get_string("a").unwrap().as_deref(), Some("1"));
        assert!(!reopened.contains("b").unwrap());
        assert!(!dir.path().join("prefs.tmp").exists());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FilePreferences::open(&path),
            Err(KeyStorageError::Corrupt { .. })
        ));
    }
}
