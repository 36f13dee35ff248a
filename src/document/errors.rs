//! Document error types
//!
//! Error codes:
//! - REVTREE_INVALID_IDENTIFIER (ERROR severity)
//! - REVTREE_INVALID_BODY (ERROR severity)
//! - REVTREE_MALFORMED_TREE (ERROR severity)
//! - REVTREE_DOCUMENT_NOT_FOUND (ERROR severity)
//! - REVTREE_CONFLICTING_WRITE (ERROR severity)
//! - REVTREE_PROJECTED_WRITE (ERROR severity)
//! - REVTREE_STORAGE_FAILURE (FATAL severity)
//!
//! Only storage failures are fatal. Everything else is reported to the
//! caller and leaves engine state untouched.

use thiserror::Error;

use crate::observability::Severity;
use crate::store::StoreError;

/// Result type for document and revision tree operations
pub type DocumentResult<T> = Result<T, DocumentError>;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("Invalid document body: {0}")]
    InvalidBody(String),

    #[error("Malformed revision tree for '{document_id}': {reason}")]
    MalformedRevisionTree { document_id: String, reason: String },

    #[error("Document not found: {document_id}{}", revision_suffix(.revision_id))]
    DocumentNotFound {
        document_id: String,
        revision_id: Option<String>,
    },

    #[error("Conflicting write on '{document_id}': expected current revision {current}, got {attempted}")]
    ConflictingWrite {
        document_id: String,
        attempted: String,
        current: String,
    },

    #[error("Projected revision {revision_id} of '{document_id}' cannot be saved; materialize a full copy first")]
    ProjectedWrite {
        document_id: String,
        revision_id: String,
    },

    #[error(transparent)]
    Storage(#[from] StoreError),
}

fn revision_suffix(revision_id: &Option<String>) -> String {
    match revision_id {
        Some(rev) => format!(" (revision {})", rev),
        None => String::new(),
    }
}

impl DocumentError {
    pub fn invalid_identifier(value: impl Into<String>, reason: impl Into<String>) -> Self {
        DocumentError::InvalidIdentifier {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed_tree(document_id: impl Into<String>, reason: impl Into<String>) -> Self {
        DocumentError::MalformedRevisionTree {
            document_id: document_id.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(document_id: impl Into<String>) -> Self {
        DocumentError::DocumentNotFound {
            document_id: document_id.into(),
            revision_id: None,
        }
    }

    pub fn revision_not_found(document_id: impl Into<String>, revision_id: impl Into<String>) -> Self {
        DocumentError::DocumentNotFound {
            document_id: document_id.into(),
            revision_id: Some(revision_id.into()),
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            DocumentError::InvalidIdentifier { .. } => "REVTREE_INVALID_IDENTIFIER",
            DocumentError::InvalidBody(_) => "REVTREE_INVALID_BODY",
            DocumentError::MalformedRevisionTree { .. } => "REVTREE_MALFORMED_TREE",
            DocumentError::DocumentNotFound { .. } => "REVTREE_DOCUMENT_NOT_FOUND",
            DocumentError::ConflictingWrite { .. } => "REVTREE_CONFLICTING_WRITE",
            DocumentError::ProjectedWrite { .. } => "REVTREE_PROJECTED_WRITE",
            DocumentError::Storage(_) => "REVTREE_STORAGE_FAILURE",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            DocumentError::Storage(_) => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Storage failures cannot be recovered at this layer.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
