//! Store - sequences, persistence and the datastore facade
//!
//! - `PersistenceBackend` is the only storage seam the engine uses
//! - `MemoryBackend` keeps everything in process
//! - `Datastore` ties revision trees to a backend and is safe to share
//!   across threads

mod backend;
mod config;
mod datastore;
mod errors;
mod memory;
mod sequence;

pub use backend::{PersistenceBackend, TreeEntry};
pub use config::DatastoreConfig;
pub use datastore::Datastore;
pub use errors::{StoreError, StoreResult};
pub use memory::MemoryBackend;
pub use sequence::SequenceAuthority;
