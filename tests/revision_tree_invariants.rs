//! Revision Tree Invariant Tests
//!
//! - Exactly one current revision per non-empty document
//! - Winner selection is independent of arrival order
//! - Sequences are assigned once, globally and monotonically
//! - Rejected writes leave the tree untouched

use std::sync::Arc;

use revtree::document::{
    AttachmentMap, DocumentBody, DocumentError, DocumentId, ForeignInsert, Revision, RevisionId,
    RevisionOptions,
};
use revtree::store::{Datastore, DatastoreConfig, MemoryBackend, PersistenceBackend};
use serde_json::json;

fn open() -> (Arc<Datastore>, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let store = Datastore::open(DatastoreConfig::default(), backend.clone()).unwrap();
    (store, backend)
}

fn body(value: serde_json::Value) -> DocumentBody {
    DocumentBody::from_value(value).unwrap()
}

fn foreign(doc: &str, rev: &str) -> Revision {
    Revision::new(doc, rev, body(json!({ "rev": rev }))).unwrap()
}

fn path(ids: &[&str]) -> Vec<RevisionId> {
    ids.iter().map(|id| RevisionId::parse(*id).unwrap()).collect()
}

fn current_count(store: &Datastore, doc: &str) -> usize {
    let latest = store.get_document(doc).unwrap();
    store
        .revisions_since(doc, 0)
        .unwrap()
        .iter()
        .filter(|r| r.is_current())
        .inspect(|r| assert_eq!(r.revision_id(), latest.revision_id()))
        .count()
}

// =============================================================================
// Winner Selection
// =============================================================================

/// Ingesting the same set of branches in every order yields one winner.
#[test]
fn test_winner_is_order_independent() {
    let branches: [(&str, &[&str]); 3] = [
        ("2-aaa", &["2-aaa", "1-root"]),
        ("2-ccc", &["2-ccc", "1-root"]),
        ("2-bbb", &["2-bbb", "1-root"]),
    ];
    let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

    for order in orders {
        let (store, _) = open();
        for index in order {
            let (rev, history) = branches[index];
            store.force_insert(&foreign("doc", rev), &path(history)).unwrap();
        }
        let winner = store.get_document("doc").unwrap();
        assert_eq!(winner.revision_id().as_str(), "2-ccc");
        assert_eq!(current_count(&store, "doc"), 1);
        assert!(store.is_conflicted("doc").unwrap());
        assert_eq!(store.conflicting_revisions("doc").unwrap().len(), 2);
    }
}

/// A long deleted branch never beats a short live one.
#[test]
fn test_live_branch_beats_deleted_branch() {
    let (store, _) = open();
    store.force_insert(&foreign("doc", "1-a"), &[]).unwrap();
    let live = store.update_document("doc", "1-a", body(json!({"v": 1}))).unwrap();
    let deleted = Revision::with_options(
        DocumentId::new("doc").unwrap(),
        RevisionId::parse("4-z").unwrap(),
        DocumentBody::empty(),
        RevisionOptions {
            deleted: true,
            ..Default::default()
        },
    );
    store
        .force_insert(&deleted, &path(&["4-z", "3-z", "2-z", "1-a"]))
        .unwrap();

    let winner = store.get_document("doc").unwrap();
    assert_eq!(winner.revision_id(), live.revision_id());
    assert!(!store.is_conflicted("doc").unwrap());
    assert_eq!(store.leaves("doc").unwrap().len(), 2);
}

// =============================================================================
// Foreign Inserts
// =============================================================================

/// Re-ingesting a revision changes nothing.
#[test]
fn test_force_insert_is_idempotent() {
    let (store, backend) = open();
    let history = path(&["3-c", "2-b", "1-a"]);
    let first = store.force_insert(&foreign("doc", "3-c"), &history).unwrap();
    assert!(matches!(first, ForeignInsert::Inserted(report) if report.inserted == 3));

    let stored = backend.revision_count().unwrap();
    let second = store.force_insert(&foreign("doc", "3-c"), &history).unwrap();
    assert!(matches!(second, ForeignInsert::AlreadyPresent { .. }));
    assert_eq!(backend.revision_count().unwrap(), stored);
    assert_eq!(store.metrics().snapshot().duplicate_foreign_inserts, 1);
}

/// Disjoint histories make a second root; each branch's history ends at
/// its own root.
#[test]
fn test_disjoint_histories_form_forest() {
    let (store, _) = open();
    store.force_insert(&foreign("doc", "2-b"), &path(&["2-b", "1-a"])).unwrap();
    store.force_insert(&foreign("doc", "2-y"), &path(&["2-y", "1-x"])).unwrap();

    assert_eq!(
        store.revision_history("doc", "2-b").unwrap(),
        path(&["2-b", "1-a"])
    );
    assert_eq!(
        store.revision_history("doc", "2-y").unwrap(),
        path(&["2-y", "1-x"])
    );
    assert!(store.is_conflicted("doc").unwrap());
}

/// A history with a generation gap is rejected before anything is stored.
#[test]
fn test_inconsistent_history_rejected() {
    let (store, backend) = open();
    let err = store
        .force_insert(&foreign("doc", "5-e"), &path(&["5-e", "3-c", "1-a"]))
        .unwrap_err();
    assert!(matches!(err, DocumentError::MalformedRevisionTree { .. }));
    assert_eq!(backend.revision_count().unwrap(), 0);
}

// =============================================================================
// Sequences
// =============================================================================

/// Sequences are shared across documents and strictly increasing.
#[test]
fn test_sequences_global_and_monotonic() {
    let (store, backend) = open();
    let a = store
        .create_document(Some("a"), body(json!({"n": 1})), AttachmentMap::new())
        .unwrap();
    let b = store
        .create_document(Some("b"), body(json!({"n": 1})), AttachmentMap::new())
        .unwrap();
    let a2 = store
        .update_document("a", a.revision_id().as_str(), body(json!({"n": 2})))
        .unwrap();

    assert_eq!(a.sequence(), 1);
    assert_eq!(b.sequence(), 2);
    assert_eq!(a2.sequence(), 3);
    assert_eq!(store.last_sequence().unwrap(), 3);
    assert_eq!(backend.last_sequence().unwrap(), 3);
}

/// Revisions since N come back in sequence order.
#[test]
fn test_revisions_since_ordered() {
    let (store, _) = open();
    let mut parent = store
        .create_document(Some("doc"), body(json!({"n": 0})), AttachmentMap::new())
        .unwrap();
    for n in 1..5 {
        parent = store
            .update_document("doc", parent.revision_id().as_str(), body(json!({"n": n})))
            .unwrap();
    }
    let sequences: Vec<i64> = store
        .revisions_since("doc", 2)
        .unwrap()
        .iter()
        .map(Revision::sequence)
        .collect();
    assert_eq!(sequences, vec![3, 4, 5]);
}

// =============================================================================
// Conflict Resolution
// =============================================================================

/// Resolving keeps the chosen leaf and tombstones the rest.
#[test]
fn test_resolve_conflicts_keeps_chosen_leaf() {
    let (store, _) = open();
    store.force_insert(&foreign("doc", "1-a"), &[]).unwrap();
    store.force_insert(&foreign("doc", "2-b"), &path(&["2-b", "1-a"])).unwrap();
    store.force_insert(&foreign("doc", "2-c"), &path(&["2-c", "1-a"])).unwrap();
    store.force_insert(&foreign("doc", "2-d"), &path(&["2-d", "1-a"])).unwrap();

    let ended = store.resolve_conflicts("doc", "2-b").unwrap();
    assert_eq!(ended, 2);
    assert!(!store.is_conflicted("doc").unwrap());
    assert_eq!(store.get_document("doc").unwrap().revision_id().as_str(), "2-b");
    assert!(store.conflicted_document_ids().unwrap().is_empty());
}

/// Resolving towards a revision that is not a live leaf is refused.
#[test]
fn test_resolve_conflicts_requires_live_leaf() {
    let (store, _) = open();
    store.force_insert(&foreign("doc", "1-a"), &[]).unwrap();
    store.force_insert(&foreign("doc", "2-b"), &path(&["2-b", "1-a"])).unwrap();
    let err = store.resolve_conflicts("doc", "1-a").unwrap_err();
    assert!(matches!(err, DocumentError::ConflictingWrite { .. }));
}

/// Only conflicted documents are listed.
#[test]
fn test_conflicted_document_ids() {
    let (store, _) = open();
    store
        .create_document(Some("calm"), body(json!({})), AttachmentMap::new())
        .unwrap();
    store.force_insert(&foreign("busy", "1-a"), &[]).unwrap();
    store.force_insert(&foreign("busy", "1-b"), &[]).unwrap();

    let ids: Vec<String> = store
        .conflicted_document_ids()
        .unwrap()
        .iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(ids, vec!["busy".to_string()]);
}
