//! revtree - a multi-version document revision tree engine
//!
//! Documents are forests of immutable revisions. Concurrent edits made on
//! different replicas become sibling branches, and every replica picks
//! the same winning revision without coordination.
//!
//! Modules:
//! - `document`: identifiers, bodies, attachments, revisions and the tree
//! - `store`: sequence allocation, persistence seam, datastore facade
//! - `encryption`: credential storage for encryption at rest
//! - `observability`: JSON logging, events and counters

pub mod document;
pub mod encryption;
pub mod observability;
pub mod store;
