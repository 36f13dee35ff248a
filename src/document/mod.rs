//! Revision tree engine
//!
//! A document is a forest of immutable revisions. This module provides:
//! - `DocumentId` / `RevisionId` - validated identifiers
//! - `DocumentBody` - immutable JSON payload
//! - `AttachmentMap` - change-observing attachment metadata
//! - `Revision` - one node of the forest, full or projected
//! - `RevisionTree` - winner selection, conflicts, local and foreign inserts
//! - `ContentDigest` - revision id generation for local edits
//!
//! The engine owns no threads and no sequence counter. Sequences come
//! from the persistence backend through the `commit` callbacks taken by
//! the tree's insert operations.

mod attachments;
mod body;
mod digest;
mod errors;
mod identifiers;
mod projected;
mod revision;
mod tree;

pub use attachments::{Attachment, AttachmentMap, ChangeHook};
pub use body::{DocumentBody, RESERVED_KEYS};
pub use digest::{ContentDigest, Sha256Digest};
pub use errors::{DocumentError, DocumentResult};
pub use identifiers::{DocumentId, RevisionId};
pub use projected::{DocumentSource, RevisionKind};
pub use revision::{BySequence, Revision, RevisionOptions, NO_PARENT, UNASSIGNED_SEQUENCE};
pub use tree::{ForeignInsert, InsertReport, RevisionTree};
