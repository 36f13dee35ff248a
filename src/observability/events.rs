//! Observable events
//!
//! Every log line the engine emits names one of these events.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    DatastoreOpened,
    TreeLoaded,

    // Writes
    RevisionInserted,
    ForeignRevisionInserted,
    ForeignRevisionSkipped,
    ConflictingWriteRejected,
    NoopSave,

    // Tree state
    WinnerChanged,
    ConflictDetected,
    ConflictsResolved,

    // Reads
    ProjectionMaterialized,
    ProjectionSourceMissing,

    // Storage
    StorageFailure,

    // Key storage
    KeyDataSaved,
    KeyDataCleared,
    KeyDataCorrupt,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::DatastoreOpened => "DATASTORE_OPENED",
            Event::TreeLoaded => "REVISION_TREE_LOADED",

            Event::RevisionInserted => "REVISION_INSERTED",
            Event::ForeignRevisionInserted => "FOREIGN_REVISION_INSERTED",
            Event::ForeignRevisionSkipped => "FOREIGN_REVISION_SKIPPED",
            Event::ConflictingWriteRejected => "CONFLICTING_WRITE_REJECTED",
            Event::NoopSave => "SAVE_SKIPPED_UNMODIFIED",

            Event::WinnerChanged => "WINNER_CHANGED",
            Event::ConflictDetected => "CONFLICT_DETECTED",
            Event::ConflictsResolved => "CONFLICTS_RESOLVED",

            Event::ProjectionMaterialized => "PROJECTION_MATERIALIZED",
            Event::ProjectionSourceMissing => "PROJECTION_SOURCE_MISSING",

            Event::StorageFailure => "STORAGE_FAILURE",

            Event::KeyDataSaved => "KEY_DATA_SAVED",
            Event::KeyDataCleared => "KEY_DATA_CLEARED",
            Event::KeyDataCorrupt => "KEY_DATA_CORRUPT",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::StorageFailure)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(Event::WinnerChanged.as_str(), "WINNER_CHANGED");
        assert_eq!(Event::KeyDataCorrupt.to_string(), "KEY_DATA_CORRUPT");
    }

    #[test]
    fn test_only_storage_failure_is_fatal() {
        assert!(Event::StorageFailure.is_fatal());
        assert!(!Event::ConflictDetected.is_fatal());
        assert!(!Event::ConflictingWriteRejected.is_fatal());
    }
}
