//! Key storage error types
//!
//! Error codes:
//! - REVTREE_KEY_IDENTIFIER (ERROR severity)
//! - REVTREE_KEY_DATA_INVALID (ERROR severity)
//! - REVTREE_KEY_DATA_CORRUPT (ERROR severity)
//! - REVTREE_PREFERENCES_IO (FATAL severity)
//! - REVTREE_LOCK_POISONED (FATAL severity)

use std::io;

use thiserror::Error;

use crate::observability::Severity;

pub type KeyStorageResult<T> = Result<T, KeyStorageError>;

#[derive(Debug, Error)]
pub enum KeyStorageError {
    #[error("Key storage identifier must not be empty")]
    EmptyIdentifier,

    #[error("Invalid key data: {0}")]
    InvalidKeyData(String),

    #[error("Stored key data under '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Preferences I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl KeyStorageError {
    pub fn code(&self) -> &'static str {
        match self {
            KeyStorageError::EmptyIdentifier => "REVTREE_KEY_IDENTIFIER",
            KeyStorageError::InvalidKeyData(_) => "REVTREE_KEY_DATA_INVALID",
            KeyStorageError::Corrupt { .. } => "REVTREE_KEY_DATA_CORRUPT",
            KeyStorageError::Io(_) => "REVTREE_PREFERENCES_IO",
            KeyStorageError::LockPoisoned(_) => "REVTREE_LOCK_POISONED",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            KeyStorageError::Io(_) | KeyStorageError::LockPoisoned(_) => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}
