//! Revision - one node of a document's revision tree
//!
//! Identity (`document_id`, `revision_id`) is fixed at construction.
//! After construction only the body, the attachments, the dirty flag
//! and, exactly once, the sequence may change. `current` is owned by
//! the tree's winner selection.
//!
//! # Equality
//!
//! Two revisions are equal iff their document ids are equal. Revision
//! id, sequence and content are ignored: equality answers "same
//! document slot", not "same revision value". Any set or map keyed by
//! `Revision` therefore holds at most one revision per document. Use
//! [`BySequence`] or compare `revision_id()` explicitly when the
//! revision value matters.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};

use serde_json::{Map, Value};

use super::attachments::{Attachment, AttachmentMap};
use super::body::DocumentBody;
use super::errors::DocumentResult;
use super::identifiers::{DocumentId, RevisionId};
use super::projected::RevisionKind;

/// Sequence of a revision that has not been durably recorded.
pub const UNASSIGNED_SEQUENCE: i64 = -1;

/// Parent sequence of a tree root. Any value `<= 0` means "no parent".
pub const NO_PARENT: i64 = -1;

/// Storage-side options for hydrating a revision.
#[derive(Clone, Debug)]
pub struct RevisionOptions {
    pub sequence: i64,
    pub internal_document_key: i64,
    pub deleted: bool,
    pub current: bool,
    pub parent_sequence: i64,
    pub attachments: Vec<Attachment>,
}

impl Default for RevisionOptions {
    fn default() -> Self {
        Self {
            sequence: UNASSIGNED_SEQUENCE,
            internal_document_key: 0,
            deleted: false,
            current: false,
            parent_sequence: NO_PARENT,
            attachments: Vec::new(),
        }
    }
}

pub struct Revision {
    document_id: DocumentId,
    revision_id: RevisionId,
    internal_document_key: i64,
    sequence: i64,
    parent_sequence: i64,
    deleted: bool,
    current: bool,
    body: DocumentBody,
    attachments: AttachmentMap,
    /// Shared with the attachment map's change hook.
    body_modified: Arc<AtomicBool>,
    /// Cleared by every mutation that can change the map.
    full_map: OnceLock<Map<String, Value>>,
    kind: RevisionKind,
}

impl Revision {
    /// Creates an unsequenced, non-deleted revision, validating both ids.
    pub fn new(document_id: &str, revision_id: &str, body: DocumentBody) -> DocumentResult<Self> {
        Ok(Self::with_options(
            DocumentId::new(document_id)?,
            RevisionId::parse(revision_id)?,
            body,
            RevisionOptions::default(),
        ))
    }

    /// Builds a revision from already-validated ids. Attachments in the
    /// options are hydrated without marking the revision dirty.
    pub fn with_options(
        document_id: DocumentId,
        revision_id: RevisionId,
        body: DocumentBody,
        options: RevisionOptions,
    ) -> Self {
        Self::assemble(
            document_id,
            revision_id,
            body,
            AttachmentMap::from_records(options.attachments),
            options.sequence,
            options.internal_document_key,
            options.parent_sequence,
            options.deleted,
            options.current,
            false,
            RevisionKind::Full,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        document_id: DocumentId,
        revision_id: RevisionId,
        body: DocumentBody,
        mut attachments: AttachmentMap,
        sequence: i64,
        internal_document_key: i64,
        parent_sequence: i64,
        deleted: bool,
        current: bool,
        body_modified: bool,
        kind: RevisionKind,
    ) -> Self {
        let body_modified = Arc::new(AtomicBool::new(body_modified));
        attachments.subscribe(dirty_hook(&body_modified));
        Self {
            document_id,
            revision_id,
            internal_document_key,
            sequence,
            parent_sequence,
            deleted,
            current,
            body,
            attachments,
            body_modified,
            full_map: OnceLock::new(),
            kind,
        }
    }

    #[inline]
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    #[inline]
    pub fn revision_id(&self) -> &RevisionId {
        &self.revision_id
    }

    /// Generation, parsed once from the revision id.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.revision_id.generation()
    }

    #[inline]
    pub fn internal_document_key(&self) -> i64 {
        self.internal_document_key
    }

    #[inline]
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    #[inline]
    pub fn is_sequenced(&self) -> bool {
        self.sequence > 0
    }

    #[inline]
    pub fn parent_sequence(&self) -> i64 {
        self.parent_sequence
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent_sequence <= 0
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    #[inline]
    pub fn is_current(&self) -> bool {
        self.current
    }

    #[inline]
    pub fn body(&self) -> &DocumentBody {
        &self.body
    }

    #[inline]
    pub fn attachments(&self) -> &AttachmentMap {
        &self.attachments
    }

    #[inline]
    pub fn kind(&self) -> &RevisionKind {
        &self.kind
    }

    #[inline]
    pub fn is_projected(&self) -> bool {
        self.kind.is_projected()
    }

    /// True once body or attachments changed after construction.
    pub fn is_body_modified(&self) -> bool {
        self.body_modified.load(AtomicOrdering::SeqCst)
    }

    /// Replaces the body. Always marks the revision dirty.
    pub fn set_body(&mut self, body: DocumentBody) {
        self.body = body;
        self.body_modified.store(true, AtomicOrdering::SeqCst);
        self.full_map = OnceLock::new();
    }

    /// Mutable access to the attachments. Mutations mark the revision
    /// dirty through the map's change hook.
    pub fn attachments_mut(&mut self) -> &mut AttachmentMap {
        &mut self.attachments
    }

    /// Replaces the whole attachment set. Counts as a content change
    /// even if the new set equals the old one.
    pub fn set_attachments(&mut self, attachments: HashMap<String, Attachment>) {
        let mut map = AttachmentMap::from_map(attachments);
        map.subscribe(dirty_hook(&self.body_modified));
        self.attachments = map;
        self.body_modified.store(true, AtomicOrdering::SeqCst);
    }

    /// Sets the sequence if it is still unassigned. Returns whether the
    /// value was taken; an already sequenced revision is never changed.
    pub fn initialize_sequence(&mut self, sequence: i64) -> bool {
        if self.sequence == UNASSIGNED_SEQUENCE {
            self.sequence = sequence;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_parent_sequence(&mut self, parent_sequence: i64) {
        self.parent_sequence = parent_sequence;
    }

    pub(crate) fn set_current(&mut self, current: bool) {
        self.current = current;
    }

    pub(crate) fn set_internal_document_key(&mut self, key: i64) {
        self.internal_document_key = key;
    }

    pub(crate) fn clear_body_modified(&mut self) {
        self.body_modified.store(false, AtomicOrdering::SeqCst);
    }

    /// Body map plus synthesized `_id`, `_rev` and, for tombstones,
    /// `_deleted: true`. Computed on first read and recomputed after
    /// any body change.
    pub fn as_full_document_map(&self) -> &Map<String, Value> {
        self.full_map.get_or_init(|| {
            let mut map = self.body.to_map();
            map.insert("_id".to_string(), Value::String(self.document_id.to_string()));
            map.insert("_rev".to_string(), Value::String(self.revision_id.to_string()));
            if self.deleted {
                map.insert("_deleted".to_string(), Value::Bool(true));
            }
            map
        })
    }

    /// Raw body bytes, without metadata keys.
    pub fn as_serialized_bytes(&self) -> Vec<u8> {
        self.body.as_bytes()
    }

    /// The persisted JSON shape: body plus metadata keys.
    pub fn to_document_json(&self) -> Vec<u8> {
        serde_json::to_vec(self.as_full_document_map()).unwrap_or_default()
    }

    /// Orders two revisions by sequence, the global commit order.
    pub fn cmp_sequence(&self, other: &Revision) -> Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

fn dirty_hook(flag: &Arc<AtomicBool>) -> super::attachments::ChangeHook {
    let flag = Arc::clone(flag);
    Arc::new(move || flag.store(true, AtomicOrdering::SeqCst))
}

impl Clone for Revision {
    /// The clone gets its own dirty flag, seeded from this one, and its
    /// attachment map reports to the clone.
    fn clone(&self) -> Self {
        Self::assemble(
            self.document_id.clone(),
            self.revision_id.clone(),
            self.body.clone(),
            self.attachments.clone(),
            self.sequence,
            self.internal_document_key,
            self.parent_sequence,
            self.deleted,
            self.current,
            self.is_body_modified(),
            self.kind.clone(),
        )
    }
}

/// Equality by document id only. See the module docs.
impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.document_id == other.document_id
    }
}

impl Eq for Revision {}

impl Hash for Revision {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.document_id.hash(state);
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Revision")
            .field("document_id", &self.document_id.as_str())
            .field("revision_id", &self.revision_id.as_str())
            .field("sequence", &self.sequence)
            .field("parent_sequence", &self.parent_sequence)
            .field("current", &self.current)
            .field("deleted", &self.deleted)
            .field("kind", &self.kind)
            .finish()
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ id: {}, rev: {}, seq: {}, parent: {}, current: {}, deleted: {} }}",
            self.document_id,
            self.revision_id,
            self.sequence,
            self.parent_sequence,
            self.current,
            self.deleted
        )
    }
}

/// Orders revisions by sequence for replaying the write log.
///
/// `Revision` itself cannot implement `Ord` by sequence because its
/// equality is by document id.
#[derive(Debug, Clone, Copy)]
pub struct BySequence<'a>(pub &'a Revision);

impl PartialEq for BySequence<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.sequence == other.0.sequence
    }
}

impl Eq for BySequence<'_> {}

impl PartialOrd for BySequence<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BySequence<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp_sequence(other.0)
    }
}
