//! Document stores
//!
//! Components persist exactly one document each through a [`DocumentStore`].
//! Production code uses [`JsonStore`]; tests use [`MemoryStore`], which can
//! also be told to fail.

use crate::error::{StorageError, StorageResult};
use crate::storage::{Storable, Storage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Load/save access to a single persisted document
#[async_trait]
pub trait DocumentStore<T>: Send + Sync {
    /// Load the document, `None` when nothing has been saved yet
    async fn load(&self) -> StorageResult<Option<T>>;

    /// Replace the stored document
    async fn save(&self, doc: &T) -> StorageResult<()>;
}

/// Shared handle to a document store
pub type SharedStore<T> = Arc<dyn DocumentStore<T>>;

/// File-backed store for a [`Storable`] document
#[derive(Debug, Clone)]
pub struct JsonStore<T> {
    storage: Storage,
    _doc: PhantomData<fn() -> T>,
}

impl<T: Storable> JsonStore<T> {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            _doc: PhantomData,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

#[async_trait]
impl<T> DocumentStore<T> for JsonStore<T>
where
    T: Storable + Send + Sync,
{
    async fn load(&self) -> StorageResult<Option<T>> {
        self.storage.load_document().await
    }

    async fn save(&self, doc: &T) -> StorageResult<()> {
        self.storage.save_document(doc).await
    }
}

/// In-process store
#[derive(Debug)]
pub struct MemoryStore<T> {
    key: String,
    doc: Mutex<Option<T>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl<T: Clone> MemoryStore<T> {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            doc: Mutex::new(None),
            fail_loads: AtomicBool::new(false),
            fail_saves: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
        }
    }

    /// Store pre-populated with a document
    pub fn with_document(key: impl Into<String>, doc: T) -> Self {
        let store = Self::new(key);
        *store.doc.lock() = Some(doc);
        store
    }

    /// Make subsequent loads fail with [`StorageError::Unavailable`]
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent saves fail with [`StorageError::Unavailable`]
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Currently stored document
    pub fn snapshot(&self) -> Option<T> {
        self.doc.lock().clone()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn unavailable(&self) -> StorageError {
        StorageError::Unavailable {
            key: self.key.clone(),
        }
    }
}

#[async_trait]
impl<T> DocumentStore<T> for MemoryStore<T>
where
    T: Clone + Send + Sync,
{
    async fn load(&self) -> StorageResult<Option<T>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        Ok(self.doc.lock().clone())
    }

    async fn save(&self, doc: &T) -> StorageResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        *self.doc.lock() = Some(doc.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::<u32>::new("test.memory");
        assert_eq!(store.load().await.unwrap(), None::<u32>);

        store.save(&7).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(7));
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_failures() {
        let store = MemoryStore::with_document("test.memory", 1u32);

        store.set_fail_saves(true);
        assert!(matches!(
            store.save(&2).await,
            Err(StorageError::Unavailable { .. })
        ));
        assert_eq!(store.snapshot(), Some(1));
        assert_eq!(store.save_count(), 0);

        store.set_fail_loads(true);
        assert!(store.load().await.is_err());
    }
}
