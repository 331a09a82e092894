//! Persistence for the climate scheduler
//!
//! Documents are stored as versioned JSON files in a `.storage/` directory,
//! one file per key. Components see only the
//! [`DocumentStore`] trait.

mod error;
mod storage;
mod store;

pub use error::{StorageError, StorageResult};
pub use storage::{Storable, Storage, StorageFile};
pub use store::{DocumentStore, JsonStore, MemoryStore, SharedStore};
