//! RevisionTree - the forest of revisions sharing a document id
//!
//! Nodes are keyed by sequence and store their parent sequence. A
//! document may hold several disjoint trees when replicas created the
//! same id independently.
//!
//! Winner selection over all leaves of all trees:
//! 1. Non-deleted leaves beat deleted leaves
//! 2. Higher generation wins
//! 3. Equal generations: lexicographically greater digest wins
//!
//! The rule depends only on the set of revisions, never on arrival
//! order, so every replica converges on the same winner.
//!
//! The tree never allocates sequences. Inserts take a `commit` callback
//! that assigns the sequence and persists the revision; the tree is
//! modified only after every callback for the insert has succeeded.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::attachments::AttachmentMap;
use super::body::DocumentBody;
use super::digest::ContentDigest;
use super::errors::{DocumentError, DocumentResult};
use super::identifiers::{DocumentId, RevisionId};
use super::projected::RevisionKind;
use super::revision::{Revision, NO_PARENT, UNASSIGNED_SEQUENCE};

/// Outcome of a successful insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertReport {
    /// Sequence of the requested revision.
    pub sequence: i64,
    /// Nodes added, including missing ancestors.
    pub inserted: usize,
    /// Whether the insert started a new disconnected tree.
    pub created_root: bool,
    /// Winner sequence before the insert, `None` on an empty tree.
    pub previous_winner: Option<i64>,
    /// Winner sequence after the insert.
    pub winner: Option<i64>,
}

impl InsertReport {
    /// True when the insert moved the winner to another revision.
    pub fn winner_changed(&self) -> bool {
        self.previous_winner != self.winner
    }
}

/// Outcome of ingesting a replicated revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignInsert {
    /// The revision was already in the tree. Nothing changed.
    AlreadyPresent { sequence: i64 },
    Inserted(InsertReport),
}

#[derive(Clone, Debug)]
struct TreeNode {
    revision: Revision,
    children: Vec<i64>,
}

#[derive(Clone, Debug)]
pub struct RevisionTree {
    document_id: DocumentId,
    internal_document_key: i64,
    nodes: BTreeMap<i64, TreeNode>,
    by_revision: HashMap<String, i64>,
    roots: Vec<i64>,
    winner: Option<i64>,
}

impl RevisionTree {
    pub fn new(document_id: DocumentId, internal_document_key: i64) -> Self {
        Self {
            document_id,
            internal_document_key,
            nodes: BTreeMap::new(),
            by_revision: HashMap::new(),
            roots: Vec::new(),
            winner: None,
        }
    }

    /// Rebuilds a tree from persisted revisions in any order.
    ///
    /// Parents must be present; stored `current` flags are ignored and
    /// the winner is recomputed.
    pub fn from_revisions(
        document_id: DocumentId,
        internal_document_key: i64,
        mut revisions: Vec<Revision>,
    ) -> DocumentResult<Self> {
        let mut tree = Self::new(document_id, internal_document_key);
        revisions.sort_by(Revision::cmp_sequence);
        for revision in revisions {
            tree.check_link(&revision, |seq| tree.nodes.get(&seq).map(|n| n.revision.generation()))?;
            tree.link(revision);
        }
        tree.recompute_winner();
        Ok(tree)
    }

    #[inline]
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    #[inline]
    pub fn internal_document_key(&self) -> i64 {
        self.internal_document_key
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, sequence: i64) -> Option<&Revision> {
        self.nodes.get(&sequence).map(|n| &n.revision)
    }

    pub fn get_revision(&self, revision_id: &str) -> Option<&Revision> {
        self.by_revision
            .get(revision_id)
            .and_then(|seq| self.get(*seq))
    }

    pub fn contains_revision(&self, revision_id: &str) -> bool {
        self.by_revision.contains_key(revision_id)
    }

    /// Parent sequence of `sequence`, or `None` for roots and unknown nodes.
    pub fn parent_of(&self, sequence: i64) -> Option<i64> {
        self.get(sequence)
            .filter(|r| !r.is_root())
            .map(Revision::parent_sequence)
    }

    /// Child sequences of `sequence`, in insertion order.
    pub fn children_of(&self, sequence: i64) -> &[i64] {
        self.nodes
            .get(&sequence)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn roots(&self) -> &[i64] {
        &self.roots
    }

    /// All revisions in sequence order.
    pub fn revisions(&self) -> impl Iterator<Item = &Revision> {
        self.nodes.values().map(|n| &n.revision)
    }

    /// Revisions with a sequence strictly greater than `since`.
    pub fn revisions_since(&self, since: i64) -> Vec<&Revision> {
        self.nodes
            .range((since.saturating_add(1))..)
            .map(|(_, n)| &n.revision)
            .collect()
    }

    /// Leaves of every tree, in sequence order.
    pub fn leaves(&self) -> Vec<&Revision> {
        self.nodes
            .values()
            .filter(|n| n.children.is_empty())
            .map(|n| &n.revision)
            .collect()
    }

    /// Non-deleted leaves, in sequence order.
    pub fn active_leaves(&self) -> Vec<&Revision> {
        self.leaves().into_iter().filter(|r| !r.is_deleted()).collect()
    }

    /// The winning revision.
    pub fn current(&self) -> Option<&Revision> {
        self.winner.and_then(|seq| self.get(seq))
    }

    /// True iff more than one non-deleted leaf exists.
    pub fn is_conflicted(&self) -> bool {
        self.nodes
            .values()
            .filter(|n| n.children.is_empty() && !n.revision.is_deleted())
            .nth(1)
            .is_some()
    }

    /// Non-deleted leaves other than the winner.
    pub fn conflicting_revisions(&self) -> Vec<&Revision> {
        self.active_leaves()
            .into_iter()
            .filter(|r| Some(r.sequence()) != self.winner)
            .collect()
    }

    /// Ancestor path of a revision, newest first, ending at its root.
    pub fn revision_history(&self, revision_id: &str) -> DocumentResult<Vec<RevisionId>> {
        let mut sequence = *self.by_revision.get(revision_id).ok_or_else(|| {
            DocumentError::revision_not_found(self.document_id.as_str(), revision_id)
        })?;
        let mut path = Vec::new();
        while let Some(node) = self.nodes.get(&sequence) {
            path.push(node.revision.revision_id().clone());
            if node.revision.is_root() {
                break;
            }
            sequence = node.revision.parent_sequence();
        }
        Ok(path)
    }

    /// Adds a child of the current winner (or a first root).
    ///
    /// `parent` must name the current winner; anything else is a
    /// `ConflictingWrite`. `None` creates the document, which is allowed
    /// on an empty tree or on top of a deleted winner.
    pub fn insert_local_edit<F>(
        &mut self,
        parent: Option<&RevisionId>,
        body: DocumentBody,
        attachments: AttachmentMap,
        deleted: bool,
        digest: &dyn ContentDigest,
        commit: F,
    ) -> DocumentResult<InsertReport>
    where
        F: FnMut(&mut Revision) -> DocumentResult<()>,
    {
        let current = self.current();
        let parent_sequence = match (parent, current) {
            (None, None) => None,
            (None, Some(winner)) if winner.is_deleted() => Some(winner.sequence()),
            (None, Some(winner)) => {
                return Err(self.conflicting_write("<none>", winner));
            }
            (Some(parent), current) => {
                if !self.contains_revision(parent.as_str()) {
                    return Err(DocumentError::revision_not_found(
                        self.document_id.as_str(),
                        parent.as_str(),
                    ));
                }
                match current {
                    Some(winner) if winner.revision_id() == parent => Some(winner.sequence()),
                    Some(winner) => return Err(self.conflicting_write(parent.as_str(), winner)),
                    None => None,
                }
            }
        };
        self.insert_child(parent_sequence, body, attachments, deleted, digest, commit)
    }

    /// Ends a non-deleted leaf with a tombstone child, whether or not it
    /// is the winner. Used by conflict resolution.
    pub fn tombstone_leaf<F>(
        &mut self,
        leaf: &RevisionId,
        digest: &dyn ContentDigest,
        commit: F,
    ) -> DocumentResult<InsertReport>
    where
        F: FnMut(&mut Revision) -> DocumentResult<()>,
    {
        let sequence = *self.by_revision.get(leaf.as_str()).ok_or_else(|| {
            DocumentError::revision_not_found(self.document_id.as_str(), leaf.as_str())
        })?;
        let is_active_leaf = self
            .nodes
            .get(&sequence)
            .map(|n| n.children.is_empty() && !n.revision.is_deleted())
            .unwrap_or(false);
        if !is_active_leaf {
            let current = self.current().map(|r| r.revision_id().to_string());
            return Err(DocumentError::ConflictingWrite {
                document_id: self.document_id.to_string(),
                attempted: leaf.to_string(),
                current: current.unwrap_or_else(|| "<none>".to_string()),
            });
        }
        self.insert_child(
            Some(sequence),
            DocumentBody::empty(),
            AttachmentMap::new(),
            true,
            digest,
            commit,
        )
    }

    fn insert_child<F>(
        &mut self,
        parent_sequence: Option<i64>,
        body: DocumentBody,
        attachments: AttachmentMap,
        deleted: bool,
        digest: &dyn ContentDigest,
        mut commit: F,
    ) -> DocumentResult<InsertReport>
    where
        F: FnMut(&mut Revision) -> DocumentResult<()>,
    {
        let parent = parent_sequence.and_then(|seq| self.get(seq));
        let generation = match parent {
            Some(p) => p.generation().checked_add(1).ok_or_else(|| {
                DocumentError::malformed_tree(
                    self.document_id.as_str(),
                    format!("revision {} is at the maximum generation", p.revision_id()),
                )
            })?,
            None => 1,
        };
        let content = digest.digest(parent.map(Revision::revision_id), deleted, &body, &attachments);
        let revision_id = RevisionId::from_parts(generation, &content)?;
        if self.contains_revision(revision_id.as_str()) {
            return Err(DocumentError::malformed_tree(
                self.document_id.as_str(),
                format!("revision {} already exists", revision_id),
            ));
        }

        let mut revision = Revision::assemble(
            self.document_id.clone(),
            revision_id,
            body,
            attachments,
            UNASSIGNED_SEQUENCE,
            self.internal_document_key,
            parent_sequence.unwrap_or(NO_PARENT),
            deleted,
            false,
            false,
            RevisionKind::Full,
        );
        commit(&mut revision)?;
        self.check_link(&revision, |seq| self.nodes.get(&seq).map(|n| n.revision.generation()))?;

        let sequence = revision.sequence();
        let previous_winner = self.winner;
        self.link(revision);
        self.recompute_winner();
        Ok(InsertReport {
            sequence,
            inserted: 1,
            created_root: parent_sequence.is_none(),
            previous_winner,
            winner: self.winner,
        })
    }

    /// Ingests a replicated revision with its ancestor path.
    ///
    /// `history` lists revision ids newest first and must start with the
    /// revision's own id; an empty history means "no known ancestors".
    /// Generations along the path must decrease by exactly one.
    /// Ancestors missing locally are inserted as empty stubs. If none of
    /// the ancestors is known, the oldest one becomes a new root.
    pub fn insert_foreign<F>(
        &mut self,
        revision: &Revision,
        history: &[RevisionId],
        mut commit: F,
    ) -> DocumentResult<ForeignInsert>
    where
        F: FnMut(&mut Revision) -> DocumentResult<()>,
    {
        if revision.is_projected() {
            return Err(DocumentError::ProjectedWrite {
                document_id: revision.document_id().to_string(),
                revision_id: revision.revision_id().to_string(),
            });
        }
        if revision.document_id() != &self.document_id {
            return Err(DocumentError::malformed_tree(
                self.document_id.as_str(),
                format!("revision belongs to document '{}'", revision.document_id()),
            ));
        }
        let path = self.validate_history(revision.revision_id(), history)?;

        if let Some(&sequence) = self.by_revision.get(revision.revision_id().as_str()) {
            return Ok(ForeignInsert::AlreadyPresent { sequence });
        }

        // First known ancestor, walking from the parent towards the root
        let known = path
            .iter()
            .enumerate()
            .skip(1)
            .find_map(|(i, id)| self.by_revision.get(id.as_str()).map(|seq| (i, *seq)));
        let missing = known.map(|(i, _)| i).unwrap_or(path.len());

        let mut staged: Vec<Revision> = path[1..missing]
            .iter()
            .rev()
            .map(|id| self.stub(id.clone()))
            .collect();
        staged.push(Revision::assemble(
            self.document_id.clone(),
            revision.revision_id().clone(),
            revision.body().clone(),
            AttachmentMap::from_records(revision.attachments().to_records()),
            UNASSIGNED_SEQUENCE,
            self.internal_document_key,
            NO_PARENT,
            revision.is_deleted(),
            false,
            false,
            RevisionKind::Full,
        ));

        let mut parent = known.map(|(_, seq)| seq).unwrap_or(NO_PARENT);
        for node in staged.iter_mut() {
            node.set_parent_sequence(parent);
            commit(node)?;
            if !node.is_sequenced() {
                return Err(DocumentError::malformed_tree(
                    self.document_id.as_str(),
                    format!("revision {} was not assigned a sequence", node.revision_id()),
                ));
            }
            parent = node.sequence();
        }

        // Validate the whole chain before touching the tree
        let mut staged_generations: HashMap<i64, u64> = HashMap::new();
        for node in &staged {
            self.check_link(node, |seq| {
                staged_generations
                    .get(&seq)
                    .copied()
                    .or_else(|| self.nodes.get(&seq).map(|n| n.revision.generation()))
            })?;
            staged_generations.insert(node.sequence(), node.generation());
        }

        let inserted = staged.len();
        let sequence = parent;
        let previous_winner = self.winner;
        for node in staged {
            self.link(node);
        }
        self.recompute_winner();
        Ok(ForeignInsert::Inserted(InsertReport {
            sequence,
            inserted,
            created_root: known.is_none(),
            previous_winner,
            winner: self.winner,
        }))
    }

    fn validate_history(
        &self,
        revision_id: &RevisionId,
        history: &[RevisionId],
    ) -> DocumentResult<Vec<RevisionId>> {
        if history.is_empty() {
            return Ok(vec![revision_id.clone()]);
        }
        if &history[0] != revision_id {
            return Err(DocumentError::malformed_tree(
                self.document_id.as_str(),
                format!(
                    "history starts with {} instead of {}",
                    history[0], revision_id
                ),
            ));
        }
        for pair in history.windows(2) {
            if pair[1].generation().checked_add(1) != Some(pair[0].generation()) {
                return Err(DocumentError::malformed_tree(
                    self.document_id.as_str(),
                    format!(
                        "{} cannot be the parent of {}: generations must be consecutive",
                        pair[1], pair[0]
                    ),
                ));
            }
        }
        Ok(history.to_vec())
    }

    fn stub(&self, revision_id: RevisionId) -> Revision {
        Revision::assemble(
            self.document_id.clone(),
            revision_id,
            DocumentBody::empty(),
            AttachmentMap::new(),
            UNASSIGNED_SEQUENCE,
            self.internal_document_key,
            NO_PARENT,
            false,
            false,
            false,
            RevisionKind::Full,
        )
    }

    fn conflicting_write(&self, attempted: &str, winner: &Revision) -> DocumentError {
        DocumentError::ConflictingWrite {
            document_id: self.document_id.to_string(),
            attempted: attempted.to_string(),
            current: winner.revision_id().to_string(),
        }
    }

    /// Checks that `revision` can join the tree. `parent_generation`
    /// resolves a sequence to its generation.
    fn check_link(
        &self,
        revision: &Revision,
        parent_generation: impl Fn(i64) -> Option<u64>,
    ) -> DocumentResult<()> {
        let malformed = |reason: String| DocumentError::malformed_tree(self.document_id.as_str(), reason);
        if revision.document_id() != &self.document_id {
            return Err(malformed(format!(
                "revision {} belongs to document '{}'",
                revision.revision_id(),
                revision.document_id()
            )));
        }
        if !revision.is_sequenced() {
            return Err(malformed(format!(
                "revision {} has no sequence",
                revision.revision_id()
            )));
        }
        if self.nodes.contains_key(&revision.sequence()) {
            return Err(malformed(format!(
                "sequence {} is already in the tree",
                revision.sequence()
            )));
        }
        if self.contains_revision(revision.revision_id().as_str()) {
            return Err(malformed(format!(
                "revision {} is already in the tree",
                revision.revision_id()
            )));
        }
        if !revision.is_root() {
            let Some(parent) = parent_generation(revision.parent_sequence()) else {
                return Err(malformed(format!(
                    "revision {} references unknown parent sequence {}",
                    revision.revision_id(),
                    revision.parent_sequence()
                )));
            };
            if parent.checked_add(1) != Some(revision.generation()) {
                return Err(malformed(format!(
                    "revision {} has generation {} but its parent has generation {}",
                    revision.revision_id(),
                    revision.generation(),
                    parent
                )));
            }
        }
        Ok(())
    }

    /// Inserts a checked revision. Call `check_link` first.
    fn link(&mut self, mut revision: Revision) {
        let sequence = revision.sequence();
        revision.set_current(false);
        revision.set_internal_document_key(self.internal_document_key);
        revision.clear_body_modified();

        if revision.is_root() {
            self.roots.push(sequence);
        } else if let Some(parent) = self.nodes.get_mut(&revision.parent_sequence()) {
            parent.children.push(sequence);
        }
        self.by_revision
            .insert(revision.revision_id().to_string(), sequence);
        self.nodes.insert(
            sequence,
            TreeNode {
                revision,
                children: Vec::new(),
            },
        );
    }

    /// Marks exactly one leaf current.
    fn recompute_winner(&mut self) {
        let winner = self
            .nodes
            .iter()
            .filter(|(_, n)| n.children.is_empty())
            .max_by(|(_, a), (_, b)| winner_rank(&a.revision, &b.revision))
            .map(|(seq, _)| *seq);

        if let Some(previous) = self.winner.and_then(|seq| self.nodes.get_mut(&seq)) {
            previous.revision.set_current(false);
        }
        if let Some(node) = winner.and_then(|seq| self.nodes.get_mut(&seq)) {
            node.revision.set_current(true);
        }
        self.winner = winner;
    }
}

/// Compares two leaves for winner selection.
fn winner_rank(a: &Revision, b: &Revision) -> Ordering {
    (!a.is_deleted())
        .cmp(&!b.is_deleted())
        .then_with(|| a.generation().cmp(&b.generation()))
        .then_with(|| a.revision_id().digest().cmp(b.revision_id().digest()))
}
