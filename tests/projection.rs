//! Projection Tests
//!
//! - A projection carries only the requested fields
//! - Materializing re-reads the complete stored revision
//! - Projections can never be saved as-is

use std::sync::Arc;

use revtree::document::{
    AttachmentMap, DocumentBody, DocumentError, DocumentId, DocumentResult, DocumentSource,
    Revision, RevisionId,
};
use revtree::store::{Datastore, DatastoreConfig, MemoryBackend};
use serde_json::json;

fn open_with_person() -> (Arc<Datastore>, Revision) {
    let backend = Arc::new(MemoryBackend::new());
    let store = Datastore::open(DatastoreConfig::default(), backend).unwrap();
    let person = store
        .create_document(
            Some("person"),
            DocumentBody::from_value(json!({"name": "mike", "age": 12, "pet": "cat"})).unwrap(),
            AttachmentMap::new(),
        )
        .unwrap();
    (store, person)
}

/// Projection keeps identity but only the requested fields.
#[test]
fn test_projection_holds_requested_fields() {
    let (store, person) = open_with_person();
    let projected = store.project("person", &["name"]).unwrap();

    assert!(projected.is_projected());
    assert_eq!(projected.revision_id(), person.revision_id());
    assert_eq!(projected.sequence(), person.sequence());
    assert_eq!(projected.body().get("name"), Some(&json!("mike")));
    assert!(projected.body().get("age").is_none());
    assert_eq!(projected.kind().fields(), Some(&["name".to_string()][..]));
}

/// The editable copy of a projection holds the whole document.
#[test]
fn test_materialize_returns_full_body() {
    let (store, _) = open_with_person();
    let projected = store.project("person", &["name"]).unwrap();
    let full = store.materialize(&projected).unwrap();

    assert!(!full.is_projected());
    assert_eq!(full.body().get("age"), Some(&json!(12)));
    assert_eq!(full.body().get("pet"), Some(&json!("cat")));
    assert_eq!(store.metrics().snapshot().projections_materialized, 1);
}

/// Saving an edited materialized copy works; saving the projection does not.
#[test]
fn test_projection_cannot_be_saved() {
    let (store, _) = open_with_person();
    let projected = store.project("person", &["name"]).unwrap();
    let err = store.save_revision(&projected).unwrap_err();
    assert!(matches!(err, DocumentError::ProjectedWrite { .. }));

    let mut full = projected.to_mutable_copy().unwrap();
    full.set_body(DocumentBody::from_value(json!({"name": "mike", "age": 13, "pet": "cat"})).unwrap());
    let saved = store.save_revision(&full).unwrap();
    assert_eq!(saved.generation(), 2);
    assert_eq!(saved.body().get("pet"), Some(&json!("cat")));
}

/// Source that has lost the backing revision.
struct EmptySource;

impl DocumentSource for EmptySource {
    fn load_full_revision(
        &self,
        _document_id: &DocumentId,
        _revision_id: &RevisionId,
    ) -> DocumentResult<Option<Revision>> {
        Ok(None)
    }
}

/// Materializing after the backing revision is gone is DocumentNotFound.
#[test]
fn test_missing_backing_revision() {
    let (store, person) = open_with_person();
    let projected = Revision::projection(&person, &["name"], Arc::new(EmptySource));
    let err = store.materialize(&projected).unwrap_err();
    assert!(matches!(err, DocumentError::DocumentNotFound { .. }));
}

/// Materializing a full revision is a plain copy.
#[test]
fn test_materialize_full_revision_copies() {
    let (store, person) = open_with_person();
    let copy = store.materialize(&person).unwrap();
    assert_eq!(copy.revision_id(), person.revision_id());
    assert!(!copy.is_body_modified());
    assert_eq!(store.metrics().snapshot().projections_materialized, 0);
}
