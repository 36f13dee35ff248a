//! Encryption key storage
//!
//! Persists the wrapped data-protection key (and the parameters needed to
//! unwrap it) for encryption at rest. The revision tree engine never
//! reads it.

mod errors;
mod key_data;
mod key_storage;
mod preferences;

pub use errors::{KeyStorageError, KeyStorageResult};
pub use key_data::{KeyData, IV_LENGTH};
pub use key_storage::KeyStorage;
pub use preferences::{FilePreferences, MemoryPreferences, PreferenceStore};
