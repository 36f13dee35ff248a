//! In-memory persistence backend
//!
//! Keeps every persisted revision in a sequence-ordered map behind one
//! mutex. Sequence allocation and persistence share that mutex, so
//! allocation is atomic and globally monotonic.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::document::{DocumentId, Revision, RevisionId};

use super::backend::{PersistenceBackend, TreeEntry};
use super::errors::{StoreError, StoreResult};
use super::sequence::SequenceAuthority;

#[derive(Debug, Default)]
struct MemoryState {
    authority: SequenceAuthority,
    revisions: BTreeMap<i64, Revision>,
    /// document id -> sequences of its revisions
    by_document: HashMap<DocumentId, Vec<i64>>,
    document_keys: HashMap<DocumentId, i64>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    /// Fault injection: fail the next sequence allocation.
    fail_next_sequence: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `next_sequence` call fail, for exercising storage
    /// fault propagation.
    pub fn fail_next_sequence(&self) {
        self.fail_next_sequence.store(true, Ordering::SeqCst);
    }

    /// Number of stored revisions across all documents.
    pub fn revision_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.revisions.len())
    }

    /// All stored revisions in sequence order.
    pub fn changes_since(&self, since: i64) -> StoreResult<Vec<Revision>> {
        let state = self.lock()?;
        Ok(state
            .revisions
            .range(since.saturating_add(1)..)
            .map(|(_, r)| r.clone())
            .collect())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::LockPoisoned("memory backend"))
    }
}

impl PersistenceBackend for MemoryBackend {
    fn next_sequence(&self) -> StoreResult<i64> {
        if self.fail_next_sequence.swap(false, Ordering::SeqCst) {
            return Err(StoreError::SequenceAllocation(
                "injected allocation failure".to_string(),
            ));
        }
        self.lock()?.authority.allocate()
    }

    fn last_sequence(&self) -> StoreResult<i64> {
        Ok(self.lock()?.authority.highest().unwrap_or(0))
    }

    fn internal_document_key(&self, document_id: &DocumentId) -> StoreResult<i64> {
        let mut state = self.lock()?;
        let next = state.document_keys.len() as i64 + 1;
        Ok(*state
            .document_keys
            .entry(document_id.clone())
            .or_insert(next))
    }

    fn load_revision(
        &self,
        document_id: &DocumentId,
        revision_id: &RevisionId,
    ) -> StoreResult<Option<Revision>> {
        let state = self.lock()?;
        let found = state
            .by_document
            .get(document_id)
            .into_iter()
            .flatten()
            .filter_map(|seq| state.revisions.get(seq))
            .find(|r| r.revision_id() == revision_id)
            .cloned();
        Ok(found)
    }

    fn load_tree(&self, document_id: &DocumentId) -> StoreResult<Vec<TreeEntry>> {
        let state = self.lock()?;
        let mut entries: Vec<TreeEntry> = state
            .by_document
            .get(document_id)
            .into_iter()
            .flatten()
            .filter_map(|seq| state.revisions.get(seq))
            .map(TreeEntry::from_revision)
            .collect();
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    fn persist(&self, revision: &Revision) -> StoreResult<()> {
        let sequence = revision.sequence();
        if sequence <= 0 {
            return Err(StoreError::PersistFailed {
                sequence,
                reason: format!("revision {} has no sequence", revision.revision_id()),
            });
        }
        if revision.is_projected() {
            return Err(StoreError::PersistFailed {
                sequence,
                reason: "projected revisions are never persisted".to_string(),
            });
        }

        let mut state = self.lock()?;
        if state.revisions.contains_key(&sequence) {
            return Ok(());
        }
        if state.authority.highest().map_or(true, |h| sequence > h) {
            // Revision sequenced elsewhere; keep the counter ahead of it
            state.authority.observe_replayed(sequence)?;
        }
        state
            .by_document
            .entry(revision.document_id().clone())
            .or_default()
            .push(sequence);
        state.revisions.insert(sequence, revision.clone());
        Ok(())
    }

    fn document_ids(&self) -> StoreResult<Vec<DocumentId>> {
        let state = self.lock()?;
        let mut ids: Vec<DocumentId> = state.by_document.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
