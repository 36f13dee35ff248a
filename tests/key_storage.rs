//! Key Storage Tests
//!
//! - Data is bound to the identifier, not the storage instance
//! - Clearing is idempotent
//! - File-backed data survives reopening

use std::sync::Arc;

use revtree::encryption::{
    FilePreferences, KeyData, KeyStorage, MemoryPreferences, PreferenceStore, IV_LENGTH,
};
use tempfile::TempDir;

fn key_data(version: &str) -> KeyData {
    KeyData::new(vec![0x5A; 48], vec![0x11; 32], vec![0x22; IV_LENGTH], 10_000, version).unwrap()
}

/// Save, read back, clear.
#[test]
fn test_save_get_clear() {
    let prefs: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferences::new());
    let storage = KeyStorage::new(prefs, "alice").unwrap();

    assert!(!storage.exists().unwrap());
    assert!(storage.get().unwrap().is_none());

    storage.save(&key_data("1.0")).unwrap();
    assert!(storage.exists().unwrap());
    assert_eq!(storage.get().unwrap(), Some(key_data("1.0")));

    storage.clear().unwrap();
    assert!(!storage.exists().unwrap());
    storage.clear().unwrap();
}

/// Two storages with the same identifier see the same data; others don't.
#[test]
fn test_identifier_scoping() {
    let prefs: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferences::new());
    let first = KeyStorage::new(Arc::clone(&prefs), "alice").unwrap();
    let second = KeyStorage::new(Arc::clone(&prefs), "alice").unwrap();
    let other = KeyStorage::new(prefs, "bob").unwrap();

    first.save(&key_data("1.0")).unwrap();
    assert_eq!(second.get().unwrap(), Some(key_data("1.0")));
    assert!(!other.exists().unwrap());
}

/// Saving again replaces the stored data.
#[test]
fn test_save_overwrites() {
    let prefs: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferences::new());
    let storage = KeyStorage::new(prefs, "alice").unwrap();
    storage.save(&key_data("1.0")).unwrap();
    storage.save(&key_data("2.0")).unwrap();
    assert_eq!(storage.get().unwrap().unwrap().version(), "2.0");
}

/// File-backed key data survives a reopen.
#[test]
fn test_file_backed_persistence() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("keys").join("prefs.json");
    {
        let prefs = Arc::new(FilePreferences::open(&path).unwrap());
        let storage = KeyStorage::new(prefs, "alice").unwrap();
        storage.save(&key_data("1.0")).unwrap();
    }

    let prefs = Arc::new(FilePreferences::open(&path).unwrap());
    let storage = KeyStorage::new(prefs, "alice").unwrap();
    let loaded = storage.get().unwrap().unwrap();
    assert_eq!(loaded.iterations(), 10_000);
    assert_eq!(loaded.iv().len(), IV_LENGTH);
    assert_eq!(loaded.encrypted_dpk(), &[0x5A; 48][..]);
}
