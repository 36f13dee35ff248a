//! KeyStorage - key data bound to one identifier
//!
//! Entries live under `dpk-<identifier>` in a preference store, so
//! storages created with the same identifier share their data.
//!
//! Unreadable stored data reads as absent and is logged; callers then
//! regenerate and overwrite it.

use std::sync::Arc;

use crate::observability::{log_event_with_fields, Event, Logger};

use super::errors::{KeyStorageError, KeyStorageResult};
use super::key_data::KeyData;
use super::preferences::PreferenceStore;

const KEY_PREFIX: &str = "dpk";

pub struct KeyStorage {
    store: Arc<dyn PreferenceStore>,
    identifier: String,
}

impl KeyStorage {
    pub fn new(store: Arc<dyn PreferenceStore>, identifier: &str) -> KeyStorageResult<Self> {
        if identifier.is_empty() {
            return Err(KeyStorageError::EmptyIdentifier);
        }
        Ok(Self {
            store,
            identifier: identifier.to_string(),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    fn storage_key(&self) -> String {
        format!("{}-{}", KEY_PREFIX, self.identifier)
    }

    /// Stored key data, or `None` if absent or unreadable.
    pub fn get(&self) -> KeyStorageResult<Option<KeyData>> {
        let key = self.storage_key();
        let Some(content) = self.store.get_string(&key)? else {
            return Ok(None);
        };
        match KeyData::from_json(&key, &content) {
            Ok(data) => Ok(Some(data)),
            Err(err) => {
                Logger::error(
                    Event::KeyDataCorrupt.as_str(),
                    &[("key", key.as_str()), ("error", err.to_string().as_str())],
                );
                Ok(None)
            }
        }
    }

    /// Writes `data`, replacing anything stored under this identifier.
    pub fn save(&self, data: &KeyData) -> KeyStorageResult<()> {
        let key = self.storage_key();
        self.store.put_string(&key, &data.to_json()?)?;
        log_event_with_fields(Event::KeyDataSaved, &[("key", key.as_str())]);
        Ok(())
    }

    /// Removes the stored data. Succeeds when nothing is stored.
    pub fn clear(&self) -> KeyStorageResult<()> {
        let key = self.storage_key();
        self.store.remove(&key)?;
        log_event_with_fields(Event::KeyDataCleared, &[("key", key.as_str())]);
        Ok(())
    }

    /// True if anything is stored under this identifier, readable or not.
    pub fn exists(&self) -> KeyStorageResult<bool> {
        self.store.contains(&self.storage_key())
    }
}
