//! Datastore - documents on top of revision trees and a persistence backend
//!
//! Responsibilities:
//! - Load each document's revision tree lazily and cache it
//! - Serialize writes per document with one lock per tree
//! - Allocate and persist sequences under a single commit lock
//! - Report events and counters for every write
//!
//! Lock order: document tree, then tree cache, then commit lock. The tree
//! cache is never held while acquiring a document tree.
//!
//! A document has at most one cached tree. Idle trees are evicted once the
//! cache exceeds its capacity; a tree some caller still holds stays cached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::document::{
    AttachmentMap, ContentDigest, DocumentBody, DocumentError, DocumentId, DocumentResult,
    DocumentSource, ForeignInsert, InsertReport, Revision, RevisionId, RevisionTree,
    Sha256Digest,
};
use crate::observability::{log_event_with_fields, Event, Logger, MetricsRegistry, Severity};

use super::backend::PersistenceBackend;
use super::config::DatastoreConfig;
use super::errors::StoreError;

type TreeHandle = Arc<Mutex<RevisionTree>>;

/// Key of a detached tree for a document with no stored revisions.
const DETACHED_KEY: i64 = 0;

pub struct Datastore {
    config: DatastoreConfig,
    backend: Arc<dyn PersistenceBackend>,
    digest: Arc<dyn ContentDigest>,
    trees: Mutex<HashMap<DocumentId, TreeHandle>>,
    commit_lock: Mutex<()>,
    metrics: MetricsRegistry,
}

impl Datastore {
    /// Opens a datastore with the SHA-256 digest sized by the config.
    pub fn open(
        config: DatastoreConfig,
        backend: Arc<dyn PersistenceBackend>,
    ) -> DocumentResult<Arc<Self>> {
        let digest = Arc::new(Sha256Digest::new(config.digest_length));
        Self::open_with_digest(config, backend, digest)
    }

    pub fn open_with_digest(
        config: DatastoreConfig,
        backend: Arc<dyn PersistenceBackend>,
        digest: Arc<dyn ContentDigest>,
    ) -> DocumentResult<Arc<Self>> {
        config.validate()?;
        Logger::set_min_severity(config.severity());

        let last_sequence = backend.last_sequence()?;
        log_event_with_fields(
            Event::DatastoreOpened,
            &[("last_sequence", &last_sequence.to_string())],
        );

        Ok(Arc::new(Self {
            config,
            backend,
            digest,
            trees: Mutex::new(HashMap::new()),
            commit_lock: Mutex::new(()),
            metrics: MetricsRegistry::new(),
        }))
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Highest sequence allocated by the backend.
    pub fn last_sequence(&self) -> DocumentResult<i64> {
        Ok(self.backend.last_sequence()?)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Creates a document, or recreates one whose winner is deleted.
    /// A missing id is generated.
    pub fn create_document(
        &self,
        document_id: Option<&str>,
        body: DocumentBody,
        attachments: AttachmentMap,
    ) -> DocumentResult<Revision> {
        let document_id = match document_id {
            Some(id) => DocumentId::new(id)?,
            None => DocumentId::generate(),
        };
        self.local_edit(&document_id, None, body, Some(attachments), false)
    }

    /// Adds a child of `parent_revision`, which must be the current
    /// winner. Attachments are carried over from the parent.
    pub fn update_document(
        &self,
        document_id: &str,
        parent_revision: &str,
        body: DocumentBody,
    ) -> DocumentResult<Revision> {
        let document_id = DocumentId::new(document_id)?;
        let parent = RevisionId::parse(parent_revision)?;
        self.local_edit(&document_id, Some(&parent), body, None, false)
    }

    /// Saves an edited copy as a child of the revision it was copied
    /// from. An unmodified copy is returned unchanged without a write.
    pub fn save_revision(&self, edited: &Revision) -> DocumentResult<Revision> {
        if edited.is_projected() {
            return Err(DocumentError::ProjectedWrite {
                document_id: edited.document_id().to_string(),
                revision_id: edited.revision_id().to_string(),
            });
        }
        if !edited.is_body_modified() {
            Logger::trace(
                Event::NoopSave.as_str(),
                &[
                    ("document_id", edited.document_id().as_str()),
                    ("revision_id", edited.revision_id().as_str()),
                ],
            );
            return Ok(edited.clone());
        }
        self.local_edit(
            edited.document_id(),
            Some(edited.revision_id()),
            edited.body().clone(),
            Some(AttachmentMap::from_records(edited.attachments().to_records())),
            edited.is_deleted(),
        )
    }

    /// Appends a tombstone to the current winner.
    pub fn delete_document(
        &self,
        document_id: &str,
        parent_revision: &str,
    ) -> DocumentResult<Revision> {
        let document_id = DocumentId::new(document_id)?;
        let parent = RevisionId::parse(parent_revision)?;
        self.local_edit(
            &document_id,
            Some(&parent),
            DocumentBody::empty(),
            Some(AttachmentMap::new()),
            true,
        )
    }

    /// Ingests a replicated revision and its ancestor path, newest first.
    pub fn force_insert(
        &self,
        revision: &Revision,
        history: &[RevisionId],
    ) -> DocumentResult<ForeignInsert> {
        if history.len() > self.config.max_revision_history {
            return Err(DocumentError::malformed_tree(
                revision.document_id().as_str(),
                format!(
                    "history of {} revisions exceeds the limit of {}",
                    history.len(),
                    self.config.max_revision_history
                ),
            ));
        }

        let document_id = revision.document_id();
        let handle = self.tree_handle(document_id, true)?;
        let mut tree = lock(&handle, "revision tree")?;
        let was_conflicted = tree.is_conflicted();
        let result = tree.insert_foreign(revision, history, self.commit());

        match self.settle(&mut tree, result)? {
            ForeignInsert::AlreadyPresent { sequence } => {
                self.metrics.increment_duplicate_foreign_inserts();
                Logger::trace(
                    Event::ForeignRevisionSkipped.as_str(),
                    &[
                        ("document_id", document_id.as_str()),
                        ("revision_id", revision.revision_id().as_str()),
                        ("sequence", &sequence.to_string()),
                    ],
                );
                Ok(ForeignInsert::AlreadyPresent { sequence })
            }
            ForeignInsert::Inserted(report) => {
                self.metrics.increment_foreign_inserts();
                log_event_with_fields(
                    Event::ForeignRevisionInserted,
                    &[
                        ("document_id", document_id.as_str()),
                        ("revision_id", revision.revision_id().as_str()),
                        ("inserted", &report.inserted.to_string()),
                        ("new_root", &report.created_root.to_string()),
                    ],
                );
                self.report_tree_changes(&tree, &report, was_conflicted);
                Ok(ForeignInsert::Inserted(report))
            }
        }
    }

    /// Tombstones every non-deleted leaf except `keep`. Returns the
    /// number of leaves ended.
    pub fn resolve_conflicts(&self, document_id: &str, keep: &str) -> DocumentResult<usize> {
        let document_id = DocumentId::new(document_id)?;
        let keep = RevisionId::parse(keep)?;
        let handle = self.tree_handle(&document_id, false)?;
        let mut tree = lock(&handle, "revision tree")?;

        let kept_is_active = tree
            .active_leaves()
            .iter()
            .any(|r| r.revision_id() == &keep);
        if !kept_is_active {
            return Err(DocumentError::ConflictingWrite {
                document_id: document_id.to_string(),
                attempted: keep.to_string(),
                current: tree
                    .current()
                    .map(|r| r.revision_id().to_string())
                    .unwrap_or_else(|| "<none>".to_string()),
            });
        }

        let losers: Vec<RevisionId> = tree
            .active_leaves()
            .into_iter()
            .map(|r| r.revision_id().clone())
            .filter(|id| id != &keep)
            .collect();
        for loser in &losers {
            let was_conflicted = tree.is_conflicted();
            let result = tree.tombstone_leaf(loser, self.digest.as_ref(), self.commit());
            let report = self.settle(&mut tree, result)?;
            self.report_tree_changes(&tree, &report, was_conflicted);
        }

        if !losers.is_empty() {
            log_event_with_fields(
                Event::ConflictsResolved,
                &[
                    ("document_id", document_id.as_str()),
                    ("kept", keep.as_str()),
                    ("tombstoned", &losers.len().to_string()),
                ],
            );
        }
        Ok(losers.len())
    }

    fn local_edit(
        &self,
        document_id: &DocumentId,
        parent: Option<&RevisionId>,
        body: DocumentBody,
        attachments: Option<AttachmentMap>,
        deleted: bool,
    ) -> DocumentResult<Revision> {
        let handle = self.tree_handle(document_id, parent.is_none())?;
        let mut tree = lock(&handle, "revision tree")?;

        let attachments = attachments.unwrap_or_else(|| {
            parent
                .and_then(|p| tree.get_revision(p.as_str()))
                .map(|r| AttachmentMap::from_records(r.attachments().to_records()))
                .unwrap_or_default()
        });
        let was_conflicted = tree.is_conflicted();
        let result = tree.insert_local_edit(
            parent,
            body,
            attachments,
            deleted,
            self.digest.as_ref(),
            self.commit(),
        );
        let report = self.settle(&mut tree, result)?;

        self.metrics.increment_local_edits();
        let inserted = tree.get(report.sequence).cloned().ok_or_else(|| {
            DocumentError::malformed_tree(
                document_id.as_str(),
                format!("sequence {} missing after insert", report.sequence),
            )
        })?;
        log_event_with_fields(
            Event::RevisionInserted,
            &[
                ("document_id", document_id.as_str()),
                ("revision_id", inserted.revision_id().as_str()),
                ("sequence", &report.sequence.to_string()),
                ("deleted", &deleted.to_string()),
            ],
        );
        self.report_tree_changes(&tree, &report, was_conflicted);
        Ok(inserted)
    }

    /// Assigns the next sequence and persists, under the commit lock.
    fn commit(&self) -> impl FnMut(&mut Revision) -> DocumentResult<()> + '_ {
        move |revision: &mut Revision| {
            let _guard = lock(&self.commit_lock, "commit")?;
            let sequence = self.backend.next_sequence()?;
            self.metrics.increment_sequences_allocated();
            revision.initialize_sequence(sequence);
            self.backend.persist(revision)?;
            Ok(())
        }
    }

    /// Observes the outcome of a tree write. Conflicting writes are
    /// counted. After a storage failure the tree is reloaded in place, under
    /// the lock the caller holds, from what actually reached the backend.
    fn settle<T>(
        &self,
        tree: &mut RevisionTree,
        result: DocumentResult<T>,
    ) -> DocumentResult<T> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        match &err {
            DocumentError::ConflictingWrite {
                attempted, current, ..
            } => {
                self.metrics.increment_conflicting_writes();
                Logger::warn(
                    Event::ConflictingWriteRejected.as_str(),
                    &[
                        ("document_id", tree.document_id().as_str()),
                        ("attempted", attempted),
                        ("current", current),
                    ],
                );
            }
            DocumentError::Storage(store_err) => {
                self.metrics.increment_storage_failures();
                Logger::log(
                    Severity::Fatal,
                    Event::StorageFailure.as_str(),
                    &[
                        ("document_id", tree.document_id().as_str()),
                        ("code", store_err.code()),
                        ("error", &store_err.to_string()),
                    ],
                );
                self.reload_in_place(tree);
            }
            _ => {}
        }
        Err(err)
    }

    fn reload_in_place(&self, tree: &mut RevisionTree) {
        match self.load_tree(tree.document_id()) {
            Ok(Some(fresh)) => *tree = fresh,
            Ok(None) => {
                *tree = RevisionTree::new(tree.document_id().clone(), tree.internal_document_key())
            }
            Err(err) => Logger::error(
                Event::StorageFailure.as_str(),
                &[
                    ("document_id", tree.document_id().as_str()),
                    ("stage", "reload"),
                    ("error", &err.to_string()),
                ],
            ),
        }
    }

    fn report_tree_changes(&self, tree: &RevisionTree, report: &InsertReport, was_conflicted: bool) {
        if report.winner_changed() {
            if let Some(winner) = tree.current() {
                log_event_with_fields(
                    Event::WinnerChanged,
                    &[
                        ("document_id", tree.document_id().as_str()),
                        ("winner", winner.revision_id().as_str()),
                    ],
                );
            }
        }
        if tree.is_conflicted() && !was_conflicted {
            self.metrics.increment_conflicts_detected();
            Logger::warn(
                Event::ConflictDetected.as_str(),
                &[
                    ("document_id", tree.document_id().as_str()),
                    ("leaves", &tree.active_leaves().len().to_string()),
                ],
            );
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The winning revision. A deleted winner is returned as is; callers
    /// check `is_deleted`.
    pub fn get_document(&self, document_id: &str) -> DocumentResult<Revision> {
        let document_id = DocumentId::new(document_id)?;
        self.read_tree(&document_id, |tree| {
            tree.current()
                .cloned()
                .ok_or_else(|| DocumentError::not_found(document_id.as_str()))
        })?
    }

    pub fn get_revision(&self, document_id: &str, revision_id: &str) -> DocumentResult<Revision> {
        let document_id = DocumentId::new(document_id)?;
        self.read_tree(&document_id, |tree| {
            tree.get_revision(revision_id).cloned().ok_or_else(|| {
                DocumentError::revision_not_found(document_id.as_str(), revision_id)
            })
        })?
    }

    pub fn is_conflicted(&self, document_id: &str) -> DocumentResult<bool> {
        let document_id = DocumentId::new(document_id)?;
        self.read_tree(&document_id, RevisionTree::is_conflicted)
    }

    /// Every leaf of every tree of the document, deleted ones included.
    pub fn leaves(&self, document_id: &str) -> DocumentResult<Vec<Revision>> {
        let document_id = DocumentId::new(document_id)?;
        self.read_tree(&document_id, |tree| {
            tree.leaves().into_iter().cloned().collect()
        })
    }

    /// Non-deleted leaves that lost winner selection.
    pub fn conflicting_revisions(&self, document_id: &str) -> DocumentResult<Vec<Revision>> {
        let document_id = DocumentId::new(document_id)?;
        self.read_tree(&document_id, |tree| {
            tree.conflicting_revisions().into_iter().cloned().collect()
        })
    }

    /// Ids of all stored documents with more than one non-deleted leaf.
    pub fn conflicted_document_ids(&self) -> DocumentResult<Vec<DocumentId>> {
        let mut conflicted = Vec::new();
        for document_id in self.backend.document_ids()? {
            if self.read_tree(&document_id, RevisionTree::is_conflicted)? {
                conflicted.push(document_id);
            }
        }
        Ok(conflicted)
    }

    /// Ancestor path of a revision, newest first.
    pub fn revision_history(
        &self,
        document_id: &str,
        revision_id: &str,
    ) -> DocumentResult<Vec<RevisionId>> {
        let document_id = DocumentId::new(document_id)?;
        self.read_tree(&document_id, |tree| tree.revision_history(revision_id))?
    }

    /// Revisions of a document with a sequence greater than `since`.
    pub fn revisions_since(&self, document_id: &str, since: i64) -> DocumentResult<Vec<Revision>> {
        let document_id = DocumentId::new(document_id)?;
        self.read_tree(&document_id, |tree| {
            tree.revisions_since(since).into_iter().cloned().collect()
        })
    }

    /// Projection of the winning revision onto `fields`, backed by this
    /// datastore for materialization.
    pub fn project(self: &Arc<Self>, document_id: &str, fields: &[&str]) -> DocumentResult<Revision> {
        let current = self.get_document(document_id)?;
        let source: Arc<dyn DocumentSource> = Arc::clone(self) as Arc<dyn DocumentSource>;
        Ok(Revision::projection(&current, fields, source))
    }

    /// Full editable copy of a revision. Projections are re-read from
    /// their source.
    pub fn materialize(&self, revision: &Revision) -> DocumentResult<Revision> {
        if !revision.is_projected() {
            return revision.to_mutable_copy();
        }
        match revision.to_mutable_copy() {
            Ok(full) => {
                self.metrics.increment_projections_materialized();
                log_event_with_fields(
                    Event::ProjectionMaterialized,
                    &[
                        ("document_id", revision.document_id().as_str()),
                        ("revision_id", revision.revision_id().as_str()),
                    ],
                );
                Ok(full)
            }
            Err(err) => {
                if matches!(err, DocumentError::DocumentNotFound { .. }) {
                    Logger::warn(
                        Event::ProjectionSourceMissing.as_str(),
                        &[
                            ("document_id", revision.document_id().as_str()),
                            ("revision_id", revision.revision_id().as_str()),
                        ],
                    );
                }
                Err(err)
            }
        }
    }

    fn read_tree<T>(
        &self,
        document_id: &DocumentId,
        read: impl FnOnce(&RevisionTree) -> T,
    ) -> DocumentResult<T> {
        let handle = self.tree_handle(document_id, false)?;
        let tree = lock(&handle, "revision tree")?;
        Ok(read(&tree))
    }

    /// Cached tree for a document, loaded from the backend on first use.
    ///
    /// A document with no stored revisions is keyed and cached only when
    /// `create` is set. Otherwise the caller gets a detached empty tree
    /// and nothing is retained.
    fn tree_handle(&self, document_id: &DocumentId, create: bool) -> DocumentResult<TreeHandle> {
        let mut trees = lock(&self.trees, "tree cache")?;
        if let Some(handle) = trees.get(document_id) {
            return Ok(Arc::clone(handle));
        }

        let tree = match self.load_tree(document_id)? {
            Some(tree) => tree,
            None if create => {
                let key = self.backend.internal_document_key(document_id)?;
                RevisionTree::new(document_id.clone(), key)
            }
            None => {
                let detached = RevisionTree::new(document_id.clone(), DETACHED_KEY);
                return Ok(Arc::new(Mutex::new(detached)));
            }
        };
        let handle = Arc::new(Mutex::new(tree));
        trees.insert(document_id.clone(), Arc::clone(&handle));
        evict_idle(&mut trees, self.config.tree_cache_capacity);
        Ok(handle)
    }

    /// Rebuilds a document's tree from the backend. `None` when nothing
    /// is stored for it.
    fn load_tree(&self, document_id: &DocumentId) -> DocumentResult<Option<RevisionTree>> {
        let entries = self.backend.load_tree(document_id)?;
        if entries.is_empty() {
            return Ok(None);
        }
        let key = self.backend.internal_document_key(document_id)?;

        let mut revisions = Vec::with_capacity(entries.len());
        for entry in &entries {
            let revision = self
                .backend
                .load_revision(document_id, &entry.revision_id)?
                .ok_or_else(|| {
                    DocumentError::malformed_tree(
                        document_id.as_str(),
                        format!("stored revision {} cannot be loaded", entry.revision_id),
                    )
                })?;
            revisions.push(revision);
        }

        let tree = RevisionTree::from_revisions(document_id.clone(), key, revisions)?;
        Logger::trace(
            Event::TreeLoaded.as_str(),
            &[
                ("document_id", document_id.as_str()),
                ("revisions", &tree.len().to_string()),
            ],
        );
        Ok(Some(tree))
    }
}

impl DocumentSource for Datastore {
    fn load_full_revision(
        &self,
        document_id: &DocumentId,
        revision_id: &RevisionId,
    ) -> DocumentResult<Option<Revision>> {
        Ok(self.backend.load_revision(document_id, revision_id)?)
    }
}

/// Drops idle cached trees until the cache fits `capacity`. A handle held
/// outside the cache is only ever cloned under the cache lock, so a strong
/// count of one means no caller can still be using it.
fn evict_idle(trees: &mut HashMap<DocumentId, TreeHandle>, capacity: usize) {
    if trees.len() <= capacity {
        return;
    }
    let idle: Vec<DocumentId> = trees
        .iter()
        .filter(|(_, handle)| Arc::strong_count(*handle) == 1)
        .map(|(id, _)| id.clone())
        .collect();
    for id in idle {
        if trees.len() <= capacity {
            break;
        }
        trees.remove(&id);
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &'static str) -> DocumentResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| DocumentError::Storage(StoreError::LockPoisoned(what)))
}
