//! Projected revisions
//!
//! A projection carries a revision's full identity but only a subset of
//! its body fields. It is read-only: `to_mutable_copy` on a projection
//! re-fetches the complete stored revision through the source it was
//! built from, so a truncated body can never reach a save.

use std::fmt;
use std::sync::Arc;

use super::attachments::AttachmentMap;
use super::body::DocumentBody;
use super::errors::{DocumentError, DocumentResult};
use super::identifiers::{DocumentId, RevisionId};
use super::revision::Revision;

/// Anything that can load the complete stored form of a revision.
pub trait DocumentSource: Send + Sync {
    fn load_full_revision(
        &self,
        document_id: &DocumentId,
        revision_id: &RevisionId,
    ) -> DocumentResult<Option<Revision>>;
}

#[derive(Clone)]
pub enum RevisionKind {
    /// The body is the complete stored body.
    Full,
    /// The body holds only `fields`; `source` yields the full revision.
    Projected {
        fields: Vec<String>,
        source: Arc<dyn DocumentSource>,
    },
}

impl RevisionKind {
    pub fn is_projected(&self) -> bool {
        matches!(self, RevisionKind::Projected { .. })
    }

    /// Projected field names, or `None` for a full revision.
    pub fn fields(&self) -> Option<&[String]> {
        match self {
            RevisionKind::Full => None,
            RevisionKind::Projected { fields, .. } => Some(fields),
        }
    }
}

impl fmt::Debug for RevisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionKind::Full => f.write_str("Full"),
            RevisionKind::Projected { fields, .. } => {
                f.debug_struct("Projected").field("fields", fields).finish()
            }
        }
    }
}

impl Revision {
    /// Builds a projection of `full` keeping only `fields` in the body.
    pub fn projection(full: &Revision, fields: &[&str], source: Arc<dyn DocumentSource>) -> Self {
        Self::assemble(
            full.document_id().clone(),
            full.revision_id().clone(),
            full.body().project(fields),
            AttachmentMap::from_records(full.attachments().to_records()),
            full.sequence(),
            full.internal_document_key(),
            full.parent_sequence(),
            full.is_deleted(),
            full.is_current(),
            false,
            RevisionKind::Projected {
                fields: fields.iter().map(|f| f.to_string()).collect(),
                source,
            },
        )
    }

    /// Builds a projection from parts already filtered by a query layer.
    pub fn projected_from_parts(
        document_id: DocumentId,
        revision_id: RevisionId,
        deleted: bool,
        body: DocumentBody,
        attachments: AttachmentMap,
        source: Arc<dyn DocumentSource>,
    ) -> Self {
        let fields = body.as_map().keys().cloned().collect();
        Self::assemble(
            document_id,
            revision_id,
            body,
            attachments,
            super::revision::UNASSIGNED_SEQUENCE,
            0,
            super::revision::NO_PARENT,
            deleted,
            false,
            false,
            RevisionKind::Projected { fields, source },
        )
    }

    /// Returns an editable copy holding the complete document.
    ///
    /// A full revision is cloned. A projection loads the stored revision
    /// from its source and fails with `DocumentNotFound` if it is gone.
    pub fn to_mutable_copy(&self) -> DocumentResult<Revision> {
        match self.kind() {
            RevisionKind::Full => Ok(self.clone()),
            RevisionKind::Projected { source, .. } => {
                match source.load_full_revision(self.document_id(), self.revision_id())? {
                    Some(full) if !full.is_projected() => Ok(full),
                    Some(_) => Err(DocumentError::malformed_tree(
                        self.document_id().as_str(),
                        "document source returned a projection",
                    )),
                    None => Err(DocumentError::revision_not_found(
                        self.document_id().as_str(),
                        self.revision_id().as_str(),
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedSource(Mutex<Option<Revision>>);

    impl DocumentSource for FixedSource {
        fn load_full_revision(
            &self,
            _document_id: &DocumentId,
            _revision_id: &RevisionId,
        ) -> DocumentResult<Option<Revision>> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn stored() -> Revision {
        Revision::new(
            "doc",
            "1-abc",
            DocumentBody::from_value(json!({"name": "mike", "age": 12, "pet": "cat"})).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_projection_limits_body() {
        let full = stored();
        let source = Arc::new(FixedSource(Mutex::new(Some(full.clone()))));
        let projected = Revision::projection(&full, &["name"], source);
        assert!(projected.is_projected());
        assert_eq!(projected.body().as_map().len(), 1);
        assert_eq!(projected.revision_id(), full.revision_id());
        assert_eq!(projected.kind().fields().unwrap(), &["name".to_string()]);
    }

    #[test]
    fn test_mutable_copy_of_projection_is_complete() {
        let full = stored();
        let source = Arc::new(FixedSource(Mutex::new(Some(full.clone()))));
        let projected = Revision::projection(&full, &["name"], source);
        let copy = projected.to_mutable_copy().unwrap();
        assert!(!copy.is_projected());
        assert_eq!(copy.body().get("age"), Some(&json!(12)));
        assert_eq!(copy.body().get("pet"), Some(&json!("cat")));
    }

    #[test]
    fn test_mutable_copy_of_vanished_document_fails() {
        let full = stored();
        let source = Arc::new(FixedSource(Mutex::new(None)));
        let projected = Revision::projection(&full, &["name"], source);
        assert!(matches!(
            projected.to_mutable_copy(),
            Err(DocumentError::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn test_mutable_copy_of_full_is_clone() {
        let full = stored();
        let copy = full.to_mutable_copy().unwrap();
        assert_eq!(copy.revision_id(), full.revision_id());
        assert_eq!(copy.body(), full.body());
    }
}
