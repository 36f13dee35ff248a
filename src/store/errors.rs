//! Storage error types
//!
//! Error codes:
//! - REVTREE_SEQUENCE_ALLOCATION (FATAL severity)
//! - REVTREE_PERSIST_FAILED (FATAL severity)
//! - REVTREE_STORAGE_IO (FATAL severity)
//! - REVTREE_STORAGE_SERIALIZATION (FATAL severity)
//! - REVTREE_LOCK_POISONED (FATAL severity)
//! - REVTREE_CONFIG_INVALID (ERROR severity)
//!
//! The tree engine cannot reason about storage recovery, so storage
//! failures are propagated unchanged.

use std::io;

use thiserror::Error;

use crate::observability::Severity;

/// Result type for persistence operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Sequence allocation failed: {0}")]
    SequenceAllocation(String),

    #[error("Persisting sequence {sequence} failed: {reason}")]
    PersistFailed { sequence: i64, reason: String },

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Storage serialization error: {0}")]
    Serialization(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::SequenceAllocation(_) => "REVTREE_SEQUENCE_ALLOCATION",
            StoreError::PersistFailed { .. } => "REVTREE_PERSIST_FAILED",
            StoreError::Io(_) => "REVTREE_STORAGE_IO",
            StoreError::Serialization(_) => "REVTREE_STORAGE_SERIALIZATION",
            StoreError::LockPoisoned(_) => "REVTREE_LOCK_POISONED",
            StoreError::Config(_) => "REVTREE_CONFIG_INVALID",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            StoreError::Config(_) => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_severity() {
        let err = StoreError::SequenceAllocation("counter unavailable".into());
        assert_eq!(err.code(), "REVTREE_SEQUENCE_ALLOCATION");
        assert_eq!(err.severity(), Severity::Fatal);
        assert_eq!(StoreError::Config("x".into()).severity(), Severity::Error);
    }

    #[test]
    fn test_from_io() {
        let err: StoreError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(matches!(err, StoreError::Io(msg) if msg.contains("boom")));
    }
}
