//! Persistence backend interface
//!
//! The revision tree engine consumes storage through this trait only.
//! Implementations own the global sequence counter and must make
//! `next_sequence` atomic, durable and monotonic across all documents.

use crate::document::{DocumentId, Revision, RevisionId};

use super::errors::StoreResult;

/// Skeleton of one stored revision, enough to rebuild a tree's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub sequence: i64,
    pub parent_sequence: i64,
    pub revision_id: RevisionId,
    pub deleted: bool,
}

impl TreeEntry {
    pub fn from_revision(revision: &Revision) -> Self {
        Self {
            sequence: revision.sequence(),
            parent_sequence: revision.parent_sequence(),
            revision_id: revision.revision_id().clone(),
            deleted: revision.is_deleted(),
        }
    }
}

pub trait PersistenceBackend: Send + Sync {
    /// Allocates the next global sequence.
    fn next_sequence(&self) -> StoreResult<i64>;

    /// Highest sequence allocated so far, 0 on a fresh store.
    fn last_sequence(&self) -> StoreResult<i64>;

    /// Opaque key shared by all revisions of a document, assigned on the
    /// first call. Only documents being written or already stored are keyed.
    fn internal_document_key(&self, document_id: &DocumentId) -> StoreResult<i64>;

    fn load_revision(
        &self,
        document_id: &DocumentId,
        revision_id: &RevisionId,
    ) -> StoreResult<Option<Revision>>;

    /// Every stored revision of a document, in sequence order.
    fn load_tree(&self, document_id: &DocumentId) -> StoreResult<Vec<TreeEntry>>;

    /// Stores a sequenced revision. Persisting a sequence that is already
    /// stored is a no-op.
    fn persist(&self, revision: &Revision) -> StoreResult<()>;

    /// Ids of every stored document.
    fn document_ids(&self) -> StoreResult<Vec<DocumentId>>;
}
